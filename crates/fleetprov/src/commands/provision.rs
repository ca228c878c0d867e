//! `fleetprov provision`: run fleet provisioning against AWS IoT.

use tokio_util::sync::CancellationToken;

use fleetprov_core::{Provisioner, ProvisionerOptions};
use fleetprov_mqtt::MqttConnector;

use crate::cli::{GlobalOpts, ProvisionArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &ProvisionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bag = super::load(global, &args.overrides)?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    let options = ProvisionerOptions {
        operation_timeout: args.timeout,
        connect_retry_delay: args.connect_retry_delay,
    };
    let provisioner = Provisioner::new(MqttConnector, options, cancel);

    let mut stages = provisioner.stages();
    let progress = tokio::spawn(async move {
        while stages.changed().await.is_ok() {
            let stage = *stages.borrow_and_update();
            tracing::info!(%stage, "provisioning progress");
        }
    });

    let result = provisioner.provision(&bag).await;
    drop(provisioner);
    interrupt.abort();
    let _ = progress.await;

    let configuration = result?;
    let rendered = output::render(global.output, &configuration)?;

    match &args.output_file {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))?;
            tracing::info!(path = %path.display(), "wrote device configuration");
        }
        None => output::print_output(&rendered, global.quiet),
    }
    Ok(())
}
