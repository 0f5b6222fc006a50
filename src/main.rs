use std::{io::Write, process, sync::Arc, time::Duration};

use scribo::{
    application::{
        auth::{AuthError, AuthService},
        comments::CommentService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        repos::{
            CommentsRepo, CreateGroupParams, FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo,
            SessionsRepo, UsersRepo,
        },
    },
    cache::FeedCache,
    config,
    infra::{db::PostgresRepositories, error::InfraError, http, media::MediaStorage, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::UserAdd(args) => run_useradd(settings, args).await,
        config::Command::GroupAdd(args) => run_groupadd(settings, args).await,
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<http::HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();

    let cache = Arc::new(FeedCache::new(settings.cache.feed_ttl));
    let media = Arc::new(
        MediaStorage::new(
            settings.media.directory.clone(),
            settings.media.max_upload_bytes.get(),
        )
        .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        follows_repo.clone(),
        cache,
        settings.feed.page_size.get(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo.clone(),
        posts_write_repo,
        groups_repo,
        comments_repo.clone(),
    ));
    let comments = Arc::new(CommentService::new(comments_repo, posts_repo));
    let follows = Arc::new(FollowService::new(follows_repo, users_repo.clone()));
    let auth = Arc::new(AuthService::new(users_repo, sessions_repo));

    Ok(http::HttpState {
        feed,
        posts,
        comments,
        follows,
        auth,
        media,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let state = build_http_state(repositories, &settings)?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "scribo::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let graceful = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(graceful))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(graceful: Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        error!(target = "scribo::serve", "failed to listen for shutdown signal");
        return;
    }
    info!(
        target = "scribo::serve",
        timeout_secs = graceful.as_secs(),
        "shutting down"
    );
}

async fn run_useradd(settings: config::Settings, args: config::UserAddArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let auth = AuthService::new(users_repo, sessions_repo);

    let password = match args.password {
        Some(password) => password,
        None => prompt_password()?,
    };

    let user = auth
        .create_user(&args.username, &password)
        .await
        .map_err(|err| match err {
            AuthError::Domain(domain) => AppError::from(domain),
            other => AppError::unexpected(other.to_string()),
        })?;

    info!(
        target = "scribo::useradd",
        username = %user.username,
        id = %user.id,
        "user created"
    );
    Ok(())
}

fn prompt_password() -> Result<String, AppError> {
    print!("Password: ");
    std::io::stdout()
        .flush()
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    let mut password = String::new();
    std::io::stdin()
        .read_line(&mut password)
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

async fn run_groupadd(
    settings: config::Settings,
    args: config::GroupAddArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let title = args.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("group title must not be empty"));
    }

    let slug = match args.slug {
        Some(slug) => slug.trim().to_string(),
        None => slug::slugify(&title),
    };
    if slug.is_empty() {
        return Err(AppError::validation("group slug must not be empty"));
    }

    let group = repositories
        .create_group(CreateGroupParams {
            slug,
            title,
            description: args.description,
        })
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    info!(
        target = "scribo::groupadd",
        slug = %group.slug,
        id = %group.id,
        "group created"
    );
    Ok(())
}
