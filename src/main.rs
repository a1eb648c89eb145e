//! rapport-web: social messaging server.
//!
//! See `rapport-web --help` for configuration.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rapport::web_client::run().await
}
