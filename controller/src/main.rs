mod commands;
mod host;
mod orchestrator;
mod ports;
mod store;
mod sync;
#[cfg(test)]
mod testutil;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
