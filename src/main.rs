#[tokio::main]
async fn main() {
    word_bomb_be::start_server().await;
}
