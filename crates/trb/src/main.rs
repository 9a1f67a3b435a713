use std::sync::Arc;

use trb_core::{config::Config, ports::Translator, Error};
use trb_gcloud::GcloudTranslator;

#[tokio::main]
async fn main() -> Result<(), Error> {
    trb_core::logging::init("trb")?;

    let cfg = Arc::new(Config::load()?);

    let translator: Arc<dyn Translator> = Arc::new(GcloudTranslator::new(
        cfg.gcloud_api_key.clone(),
        cfg.target_language.clone(),
        cfg.fallback_language.clone(),
    )?);

    trb_telegram::router::run_polling(cfg, translator)
        .await
        .map_err(|e| match e.downcast::<Error>() {
            Ok(core) => core,
            Err(other) => Error::External(format!("telegram bot failed: {other}")),
        })?;

    tracing::info!("bye");
    Ok(())
}
