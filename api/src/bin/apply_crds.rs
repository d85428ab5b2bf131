use frappe_operator::{Client, Result};

#[tokio::main]
async fn main() -> Result<()> {
    Client::infer().await?.patch_all_crds().await
}
