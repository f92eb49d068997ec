#[tokio::main]
async fn main() {
    bracket_engine::run().await
}
