use anyhow::Result;
use controller::Controller;

#[actix_web::main]
async fn main() {
    controller::try_or_exit(run()).await;
}

async fn run() -> Result<()> {
    if let Some(controller) = Controller::create("JUG Site Controller").await? {
        controller.run().await?;
    }

    Ok(())
}
