use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use movie_pager::catalog::CatalogClient;
use movie_pager::config;
use movie_pager::db::{self, Store};
use movie_pager::model::{ContentKind, VideoRef};
use movie_pager::paging::{LoadState, PagedList, Pager, PagingData};
use movie_pager::refresh;
use movie_pager::repository::Repository;
use movie_pager::session::DetailSession;

#[derive(Debug, Parser)]
#[command(author, version, about = "Browse and cache a remote movie catalog")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Movie,
    Show,
}

impl From<Kind> for ContentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Movie => ContentKind::Movie,
            Kind::Show => ContentKind::Show,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Page through the popular list, fetching remote pages as needed
    Browse {
        #[arg(long, value_enum, default_value = "movie")]
        kind: Kind,
        /// Number of local pages to scroll through
        #[arg(long, default_value = "2")]
        pages: usize,
    },
    /// Page through the reviews of one video
    Reviews {
        #[arg(long, value_enum, default_value = "movie")]
        kind: Kind,
        #[arg(long)]
        id: i64,
        #[arg(long, default_value = "1")]
        pages: usize,
    },
    /// Show details and clips of one video
    Details {
        #[arg(long, value_enum, default_value = "movie")]
        kind: Kind,
        #[arg(long)]
        id: i64,
    },
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoriteAction,
    },
    /// Refresh first pages, details and clips once
    Refresh,
    /// Print a sample configuration file
    ExampleConfig,
}

#[derive(Debug, Subcommand)]
enum FavoriteAction {
    List {
        #[arg(long, value_enum, default_value = "movie")]
        kind: Kind,
    },
    Add {
        #[arg(long, value_enum, default_value = "movie")]
        kind: Kind,
        #[arg(long)]
        id: i64,
    },
    Remove {
        #[arg(long, value_enum, default_value = "movie")]
        kind: Kind,
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let catalog = Arc::new(CatalogClient::from_config(&cfg)?);
    let repo = Repository::new(Store::new(pool), catalog, cfg.paging);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    match args.command {
        Command::Browse { kind, pages } => {
            let pager = repo.videos(kind.into());
            browse(&pager, pages, &cancel, |v| {
                format!("{:>8}  {}", v.id, v.title.as_deref().unwrap_or("<untitled>"))
            })
            .await?;
        }
        Command::Reviews { kind, id, pages } => {
            let mut session = DetailSession::new();
            let pager = session.reviews(&repo, VideoRef { kind: kind.into(), id });
            browse(&pager, pages, &cancel, |r| {
                format!(
                    "{}: {}",
                    r.author.as_deref().unwrap_or("anonymous"),
                    excerpt(r.content.as_deref())
                )
            })
            .await?;
        }
        Command::Details { kind, id } => {
            let mut session = DetailSession::new();
            let video = VideoRef { kind: kind.into(), id };
            if let Some((details, clips)) = session.details(&repo, video).await? {
                let v = details.value;
                println!("{} ({:?})", v.title.as_deref().unwrap_or("<untitled>"), details.source);
                println!("released: {}", v.release_date.as_deref().unwrap_or("-"));
                println!(
                    "rating:   {:.1} ({} votes)",
                    v.vote_average.unwrap_or_default(),
                    v.vote_count.unwrap_or_default()
                );
                println!("favorite: {}", repo.is_favorite(video).await?);
                println!("{}", v.overview.as_deref().unwrap_or(""));
                for clip in clips.value {
                    println!(
                        "  clip {} [{}] {}",
                        clip.name.as_deref().unwrap_or("-"),
                        clip.site.as_deref().unwrap_or("-"),
                        clip.key.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Command::Favorites { action } => match action {
            FavoriteAction::List { kind } => {
                for fav in repo.favorites(kind.into()).await? {
                    println!(
                        "{:>8}  {}  (added {})",
                        fav.id,
                        fav.title.as_deref().unwrap_or("<untitled>"),
                        fav.added_at
                    );
                }
            }
            FavoriteAction::Add { kind, id } => {
                let target = VideoRef { kind: kind.into(), id };
                let video = match repo.cached_video(target).await? {
                    Some(video) => video,
                    None => repo.details(target).await?.value,
                };
                repo.add_favorite(&video).await?;
                println!("added {} {}", target.kind, id);
            }
            FavoriteAction::Remove { kind, id } => {
                let removed = repo.remove_favorite(VideoRef { kind: kind.into(), id }).await?;
                println!("{}", if removed { "removed" } else { "not a favorite" });
            }
        },
        Command::Refresh => {
            let report = refresh::refresh_with_retry(&repo, &cfg.refresh, &cancel).await?;
            println!(
                "refreshed {} lists, {} videos ({} details, {} failures)",
                report.lists, report.videos, report.details, report.failures
            );
        }
        Command::ExampleConfig => {}
    }

    Ok(())
}

/// Scroll `pages` local pages deep, printing every new item.
async fn browse<L, F>(
    pager: &Pager<L>,
    pages: usize,
    cancel: &CancellationToken,
    render: F,
) -> Result<()>
where
    L: PagedList,
    F: Fn(&L::Item) -> String,
{
    if let Some(result) = pager.initialize().await? {
        info!(?result, "initial refresh");
    }
    let page_size = pager.config().page_size;
    let mut printed = 0;
    for _ in 0..pages {
        if cancel.is_cancelled() {
            warn!("interrupted");
            break;
        }
        let data = pager.snapshot().await?;
        report_errors(&data);
        if data.items.len() <= printed {
            break;
        }
        for item in &data.items[printed..] {
            println!("{}", render(item));
        }
        printed = data.items.len();
        pager.access(printed.saturating_sub(1)).await?;
        if printed >= pages * page_size {
            break;
        }
    }
    let data = pager.snapshot().await?;
    if data.load_states.append.end_of_pagination_reached() {
        println!("-- end of list ({} cached) --", data.total);
    }
    pager.close();
    Ok(())
}

fn report_errors<T>(data: &PagingData<T>) {
    for (direction, state) in [
        ("refresh", &data.load_states.refresh),
        ("prepend", &data.load_states.prepend),
        ("append", &data.load_states.append),
    ] {
        if let LoadState::Error(err) = state {
            warn!(direction, %err, "load failed");
            if direction == "refresh" && data.items.is_empty() {
                eprintln!("could not load list: {err}");
            }
        }
    }
}

fn excerpt(content: Option<&str>) -> String {
    let text = content.unwrap_or("").replace('\n', " ");
    if text.chars().count() > 80 {
        format!("{}…", text.chars().take(80).collect::<String>())
    } else {
        text
    }
}
