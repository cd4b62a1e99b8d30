use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use assistant_api::AssistantApiClient;
use assistant_api_mock::MockAssistantBackend;
use coddle_assistant::{init_logging, BackendKind, EnvConfig};
use coddle_chat::{parse_args, ChatSession, CliCommand, OFFLINE_REPLY, USAGE};
use tracing::warn;

#[tokio::main]
async fn main() -> ExitCode {
    let config = EnvConfig::from_env();
    init_logging(&config.log_filter);

    let (mode, message) = match parse_args(std::env::args().skip(1)) {
        Ok(CliCommand::Chat { mode, message }) => (mode, message),
        Ok(CliCommand::Help) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            eprintln!("{error}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let api_config = config.api_config();
    let mut stdout = io::stdout();
    let result = match config.backend {
        BackendKind::Mock => {
            let backend = Arc::new(MockAssistantBackend::new().with_auto_reply(OFFLINE_REPLY));
            ChatSession::new(backend, &api_config)
                .ask(mode, &message, &mut stdout)
                .await
        }
        BackendKind::Http => match AssistantApiClient::new(api_config.clone()) {
            Ok(client) => {
                if !client.check_api_connection().await {
                    warn!(base_url = %api_config.base_url, "assistant api did not answer the status probe");
                }
                ChatSession::new(Arc::new(client), &api_config)
                    .ask(mode, &message, &mut stdout)
                    .await
            }
            Err(error) => Err(error.into()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", error.user_message());
            ExitCode::FAILURE
        }
    }
}
