// basalt-cli — driver and diagnostics for the basalt relay
//
// `motd` renders the server-list advertisement for a given configuration;
// `selftest` drives a scripted session through the in-memory transport the
// way an embedding proxy would drive the relay from its tick loop.

use anyhow::{ensure, Result};
use basalt_core::relay::{GAME_VERSION, PROTOCOL_VERSION};
use basalt_core::{
    Advertisement, EncapsulatedMessage, GamePacket, LocalTransport, RelayController, SendFlags,
    SessionFactory, SessionId, SessionRegistry, TransportEvent, UpstreamSession, BATCH_PACKET_ID,
    FRAME_BYTE,
};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(name = "basalt")]
#[command(about = "Basalt — transport relay for a Bedrock-protocol game proxy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the server-list advertisement string
    Motd {
        #[arg(short, long, default_value = "Basalt Proxy")]
        name: String,
        #[arg(long, default_value_t = 0)]
        players: u32,
        #[arg(long, default_value_t = 20)]
        max_players: u32,
        #[arg(long, default_value_t = PROTOCOL_VERSION)]
        protocol_version: u32,
        #[arg(long, default_value = GAME_VERSION)]
        game_version: String,
    },
    /// Drive a scripted session through the in-memory transport
    Selftest {
        /// Tick interval in milliseconds
        #[arg(long, default_value_t = 50)]
        tick_ms: u64,
        /// Number of ticks to run
        #[arg(long, default_value_t = 5)]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Motd {
            name,
            players,
            max_players,
            protocol_version,
            game_version,
        } => cmd_motd(name, players, max_players, protocol_version, game_version),
        Commands::Selftest { tick_ms, ticks } => cmd_selftest(tick_ms, ticks).await,
    }
}

fn cmd_motd(
    name: String,
    players: u32,
    max_players: u32,
    protocol_version: u32,
    game_version: String,
) -> Result<()> {
    let advert = Advertisement {
        server_name: name,
        protocol_version,
        game_version,
        players,
        max_players,
    };
    println!("{}", advert);
    Ok(())
}

struct EchoSession {
    identifier: String,
    peer: SocketAddr,
    received: Mutex<Vec<Vec<u8>>>,
}

impl UpstreamSession for EchoSession {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn handle_binary(&self, payload: &[u8]) {
        debug!(identifier = %self.identifier, len = payload.len(), "session received payload");
        self.received.lock().push(payload.to_vec());
    }

    fn on_disconnect(&self, reason: &str) {
        debug!(identifier = %self.identifier, reason, "session disconnected");
    }
}

#[derive(Default)]
struct EchoFactory {
    created: Mutex<Vec<Arc<EchoSession>>>,
}

impl SessionFactory for EchoFactory {
    fn create(
        &self,
        identifier: SessionId,
        peer: SocketAddr,
        _client_token: u64,
    ) -> Arc<dyn UpstreamSession> {
        let session = Arc::new(EchoSession {
            identifier,
            peer,
            received: Mutex::new(Vec::new()),
        });
        self.created.lock().push(Arc::clone(&session));
        session
    }
}

struct ScriptPacket(Vec<u8>);

impl GamePacket for ScriptPacket {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

async fn cmd_selftest(tick_ms: u64, ticks: u32) -> Result<()> {
    let transport = Arc::new(LocalTransport::new());
    let factory = Arc::new(EchoFactory::default());
    let relay = RelayController::new(
        transport.clone(),
        Arc::new(SessionRegistry::new()),
        factory.clone(),
    );

    // Script: one peer appears and sends a framed three-byte payload.
    transport.inject(TransportEvent::SessionOpened {
        identifier: "local:1".into(),
        address: "127.0.0.1".into(),
        port: 19132,
        client_token: 1,
    });
    transport.inject(TransportEvent::Encapsulated {
        identifier: "local:1".into(),
        message: EncapsulatedMessage::reliable_ordered(vec![FRAME_BYTE, 0x01, 0x02, 0x03]),
        flags: SendFlags::from_bits(0),
    });

    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
    for _ in 0..ticks {
        interval.tick().await;
        relay.on_tick();
    }

    relay.set_broadcast_name("Basalt Selftest", 1, 20);
    relay.send_packet("local:1", &ScriptPacket(vec![0xAA; 64]), false);
    relay.send_packet("local:1", &ScriptPacket(vec![0xBB; 2048]), false);

    let sessions = factory.created.lock();
    ensure!(sessions.len() == 1, "expected one session, got {}", sessions.len());
    let received = sessions[0].received.lock();
    ensure!(
        *received == vec![vec![0x01u8, 0x02, 0x03]],
        "session received unexpected payloads: {:?}",
        received
    );
    println!("✓ Session opened and framed payload delivered stripped");

    let sends = transport.sends();
    ensure!(sends.len() == 2, "expected two sends, got {}", sends.len());
    ensure!(
        sends[0].message.payload.len() == 65 && sends[0].message.payload[0] == FRAME_BYTE,
        "small packet not framed as expected"
    );
    ensure!(
        sends[1].message.payload[0] == FRAME_BYTE
            && sends[1].message.payload[1] == BATCH_PACKET_ID,
        "oversized packet was not batch-wrapped"
    );
    println!("✓ Outbound framing and 512-byte batching hold");

    let options = transport.options();
    ensure!(
        options.iter().any(|(name, value)| name == "name" && value.starts_with("MCPE;")),
        "advertisement never reached the option channel"
    );
    println!("✓ Advertisement published: {}", options[0].1);

    relay.disconnect("local:1", "selftest over");
    relay.shutdown()?;
    println!("✓ Shutdown clean");
    Ok(())
}
