use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    tpuff_cli::main_entry().await
}
