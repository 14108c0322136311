#[tokio::main]
async fn main() -> std::io::Result<()> {
    careboard::run().await
}
