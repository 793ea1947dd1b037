#[tokio::main]
async fn main() -> anyhow::Result<()> {
    casevault::server::run().await
}
