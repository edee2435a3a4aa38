use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use distrank::config::{ConfigSource, FileSource, PromptSource};
use distrank::control::{ControlServer, PeerClient, Request, Response};
use distrank::node::{MasterNode, WorkerNode};
use distrank::queue::{NatsWorkQueues, QueueNames};

const CONFIG_FILE: &str = "config.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let master_endpoint = env::var("MASTER").unwrap_or_else(|_| "127.0.0.1:7000".to_string());
    let nats_url = env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string());
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT").unwrap_or_else(|_| "7000".to_string()).parse()?;
    let endpoint = format!("{host}:{port}");

    // Contact the master to join the network. No answer means this
    // node founds a new network and becomes the master itself.
    let join = PeerClient::new(&master_endpoint, Duration::from_secs(5))
        .call(&Request::Join {
            endpoint: endpoint.clone(),
        })
        .await;

    match join {
        Ok(Response::JoinAccepted { queues: names, state }) => {
            info!(master = %master_endpoint, %endpoint, "joined the network as worker");
            let queues = Arc::new(NatsWorkQueues::connect(&nats_url, names).await?);
            let worker = Arc::new(WorkerNode::new(queues));
            worker.install_state(state).await?;

            let server = ControlServer::bind(&endpoint).await?;
            server.spawn(worker.clone());
            worker.run().await?;
        }
        Ok(other) => {
            error!("unexpected join response: {other:?}");
            std::process::exit(1);
        }
        Err(e) => {
            info!(master = %master_endpoint, "no master found ({e}); starting a new network");
            let queues = Arc::new(NatsWorkQueues::connect(&nats_url, QueueNames::default()).await?);

            let source: Box<dyn ConfigSource> = if Path::new(CONFIG_FILE).exists() {
                Box::new(FileSource::new(CONFIG_FILE))
            } else {
                info!("no {CONFIG_FILE}; configuration will be asked for interactively");
                Box::new(PromptSource)
            };
            let master = Arc::new(MasterNode::new(queues).with_source(source));

            let server = ControlServer::bind(&endpoint).await?;
            server.spawn(master.clone());
            master.run().await?;
        }
    }
    Ok(())
}
