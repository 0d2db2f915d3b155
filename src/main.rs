#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jewel_pricing::run().await
}
