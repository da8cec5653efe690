//! `fieldlink send`: connect, send one command, disconnect.

use std::sync::Arc;

use fieldlink_config::Config;
use fieldlink_core::{
    ConnectionManager, ConnectionState, TelemetryStore, WsConnector, parse_action,
};

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;

pub async fn handle(args: SendArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let device = config.find_device(&args.device)?;
    let endpoint = device.endpoint.clone();

    // Validate before touching the network.
    let command = parse_action(endpoint.device_type(), &args.action, &args.values)?;

    let manager_config = config.manager_config()?;
    let connector = WsConnector::new(manager_config.keepalive.clone());
    let manager = ConnectionManager::spawn(
        endpoint.clone(),
        manager_config,
        Arc::new(connector),
        TelemetryStore::disabled(),
    );

    let mut states = manager.connection_state();
    manager.connect();

    let settled = tokio::time::timeout(
        args.timeout,
        states.wait_for(|s| {
            matches!(
                s,
                ConnectionState::Connected | ConnectionState::GracePeriod | ConnectionState::Failed
            )
        }),
    )
    .await
    .map(|waited| waited.map(|state| *state));

    let result = match settled {
        Err(_) => Err(CliError::Timeout {
            device: device.name.clone(),
            seconds: args.timeout.as_secs(),
        }),
        Ok(Err(_)) => Err(CliError::Internal(format!(
            "connection manager for {} stopped",
            device.name
        ))),
        Ok(Ok(state)) if state != ConnectionState::Connected => Err(CliError::ConnectionFailed {
            device: device.name.clone(),
            url: endpoint.url().to_string(),
        }),
        Ok(Ok(_)) => manager.send(command).await.map_err(CliError::from),
    };

    manager.disconnect();
    manager.shutdown().await;

    result?;
    tracing::info!(device = %device.name, action = %args.action, "command sent");
    if !global.quiet {
        eprintln!("{}: {} sent", device.name, args.action);
    }
    Ok(())
}
