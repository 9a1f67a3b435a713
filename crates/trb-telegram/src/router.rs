use std::sync::Arc;

use teloxide::{
    dispatching::{Dispatcher, ShutdownToken, UpdateHandler},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    update_listeners::Polling,
};

use trb_core::{
    commands::CommandRegistry,
    config::Config,
    dispatch::Dispatcher as UpdateDispatcher,
    errors::Error,
    lifecycle::Lifecycle,
    messaging::{
        port::{MessagingPort, ProfilePort},
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    offload::OffloadPool,
    ports::Translator,
    security::AuthorizationFilter,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<UpdateDispatcher>,
}

fn build_bot(cfg: &Config) -> Result<Bot, Error> {
    // Long polling holds the request open for `polling_timeout`.
    let client = teloxide::net::default_reqwest_settings()
        .connect_timeout(cfg.connect_timeout)
        .timeout(cfg.request_timeout + cfg.polling_timeout)
        .build()
        .map_err(|e| Error::Config(format!("telegram http client: {e}")))?;
    Ok(Bot::with_client(cfg.telegram_bot_token.clone(), client))
}

/// Run the bot until a shutdown signal arrives.
///
/// Fatal setup errors (`trb_core::Error::Config`) are returned inside the
/// `anyhow::Error`; the offload pool is always drained before returning once
/// it exists.
pub async fn run_polling(cfg: Arc<Config>, translator: Arc<dyn Translator>) -> anyhow::Result<()> {
    tracing::info!("create application begin");

    let bot = build_bot(&cfg)?;
    let commands = CommandRegistry::from_texts()?;
    let pool = Arc::new(OffloadPool::new(translator)?);

    let telegram = Arc::new(TelegramMessenger::new(bot.clone()));
    let profile: Arc<dyn ProfilePort> = telegram.clone();
    let raw_messenger: Arc<dyn MessagingPort> = telegram;
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let mut dispatcher = UpdateDispatcher::new(
        AuthorizationFilter::new(cfg.whitelist.clone()),
        commands,
        messenger,
        pool.clone(),
    );
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(username = %me.username(), "bot identity");
            dispatcher = dispatcher.with_bot_username(me.username());
        }
        Err(e) => tracing::warn!(error = %e, "get_me failed; accepting /cmd@any"),
    }

    let lifecycle = Lifecycle::new(
        profile,
        dispatcher.commands().clone(),
        pool,
        Some(cfg.shutdown_timeout),
    )
    .with_tasks(dispatcher.tasks());
    tracing::info!("create application end");

    lifecycle.start().await;
    let state = Arc::new(AppState {
        dispatcher: Arc::new(dispatcher),
    });
    serve(bot, state, &cfg).await;
    // Polling has stopped; finish translations and their replies.
    lifecycle.stop().await;

    Ok(())
}

/// New and edited messages both go to the translator; an edit gets a fresh
/// reply.
fn update_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_message))
}

async fn serve(bot: Bot, state: Arc<AppState>, cfg: &Config) {
    let mut dispatcher = Dispatcher::builder(bot.clone(), update_handler())
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .build();

    tokio::spawn(shutdown_on_signal(dispatcher.shutdown_token()));

    let listener = Polling::builder(bot)
        .timeout(cfg.polling_timeout)
        .build();

    tracing::info!("run begin");
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener error"),
        )
        .await;
    tracing::info!("run end");
}

async fn shutdown_on_signal(token: ShutdownToken) {
    wait_for_signal().await;
    tracing::info!("shutdown signal received");
    match token.shutdown() {
        Ok(done) => done.await,
        Err(e) => tracing::warn!(error = %e, "dispatcher was not running"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM; using Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
