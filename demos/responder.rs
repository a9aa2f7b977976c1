//! Run a node with in memory collaborators and replay a scripted exchange against it.
//!
//! Run with: cargo run --example responder -- "Hello World!"

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn, Level};

use kadserve::peerstore::{AddressBook, MemoryPeerstore};
use kadserve::routing_table::KademliaTable;
use kadserve::validator::{immutable_key, MutableValue};
use kadserve::{
    Connectedness, ContentId, Context, Message, MessageType, Node, NodeSettings, PeerId, Record,
    Server, SigningKey, WirePeer, RAW, SHA2_256,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Value to store
    value: String,
    /// Number of worker threads
    #[arg(long, default_value_t = kadserve::DEFAULT_WORKERS)]
    workers: usize,
    /// Number of fake peers to fill the routing table with
    #[arg(long, default_value_t = 32)]
    peers: u8,
    /// Log every handler decision
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::TRACE
        } else {
            Level::INFO
        })
        .with_thread_names(true)
        .init();

    let id = PeerId::random();
    let peerstore = Arc::new(MemoryPeerstore::new());
    let routing_table = Arc::new(KademliaTable::new(id.clone()));

    for n in 0..cli.peers {
        let peer = PeerId::random();

        peerstore.add_addresses(
            &peer,
            &[SocketAddr::from(([10, 0, 0, n], 4001))],
            Duration::from_secs(3600),
        );
        routing_table.add(peer);
    }

    let server = Server::builder(id.clone())
        .with_addresses(vec![SocketAddr::from(([127, 0, 0, 1], 4001))])
        .with_peerstore(peerstore.clone())
        .with_routing_table(routing_table)
        .build();

    let node = Node::new(
        server,
        NodeSettings {
            workers: cli.workers,
        },
    )
    .expect("Failed to start node");

    info!(?id, "Node is running");

    let remote = PeerId::random();
    peerstore.set_connectedness(&remote, Connectedness::Connected);

    let request = |message: Message| {
        let start = Instant::now();
        let message_type = message.message_type;

        // Everything goes through the wire codec, as it would coming off a stream.
        let bytes = message.to_bytes().expect("Failed to encode message");
        let message = Message::from_bytes(bytes).expect("Failed to decode message");

        let result = node
            .submit(
                Context::with_timeout(Duration::from_secs(5)),
                remote.clone(),
                message,
            )
            .wait();

        match &result {
            Ok(Some(response)) => info!(
                %message_type,
                record = response.record.is_some(),
                closer_peers = response.closer_peers.len(),
                provider_peers = response.provider_peers.len(),
                elapsed = ?start.elapsed(),
                "Response"
            ),
            Ok(None) => info!(%message_type, elapsed = ?start.elapsed(), "Done, no response"),
            Err(error) => warn!(%message_type, %error, "Request failed"),
        }

        result
    };

    // Immutable value
    let key = immutable_key(cli.value.as_bytes());

    request(
        Message::new(MessageType::PutValue, key.clone(), 0)
            .with_record(Record::new(key.clone(), cli.value.clone().into_bytes())),
    )
    .ok();

    if let Ok(Some(response)) = request(Message::new(MessageType::GetValue, key, 0)) {
        if let Some(record) = response.record {
            info!(value = ?String::from_utf8_lossy(&record.value), "Got immutable value back");
        }
    }

    // Mutable value, the older sequence number is refused.
    let signer = SigningKey::from_bytes(&rand::random());
    let newer = MutableValue::new(&signer, cli.value.as_bytes(), 1, None);
    let older = MutableValue::new(&signer, b"older", 0, None);
    let key = newer.dht_key();

    for item in [newer, older] {
        let value = item.to_bytes().expect("Failed to encode mutable value");

        request(
            Message::new(MessageType::PutValue, key.clone(), 0)
                .with_record(Record::new(key.clone(), value)),
        )
        .ok();
    }

    // Peers
    request(Message::new(MessageType::FindNode, id.to_bytes(), 0)).ok();
    request(Message::new(MessageType::FindNode, remote.to_bytes(), 0)).ok();

    // Providers
    let cid = ContentId::new_v1(RAW, SHA2_256, &rand::random::<[u8; 32]>());

    request(
        Message::new(MessageType::AddProvider, cid.as_bytes().to_vec(), 0).with_provider_peers(
            vec![WirePeer {
                id: remote.clone(),
                addresses: vec![SocketAddr::from(([192, 168, 1, 1], 4001))],
                connection: Connectedness::NotConnected,
            }],
        ),
    )
    .ok();
    request(Message::new(MessageType::GetProviders, cid.as_bytes().to_vec(), 0)).ok();

    request(Message::new(MessageType::Ping, Vec::<u8>::new(), 0)).ok();
    request(Message::new(MessageType::from_i32(42), Vec::<u8>::new(), 0)).ok();

    node.shutdown();
}
