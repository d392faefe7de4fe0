#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coursevox_lib::run().await
}
