// Project Maester - Academic Records Sync Server

use academic_records_sync_server::{app::run, error::MaesterResult};

#[tokio::main]
async fn main() -> MaesterResult<()> {
    run().await
}
