#[tokio::main]
async fn main() -> anyhow::Result<()> {
    spirit::start_server().await
}
