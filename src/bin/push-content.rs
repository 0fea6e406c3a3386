//! Display content push utility
//!
//! Publishes a content push, a command or a broadcast to a display the same
//! way the cloud platform does, for manual end-to-end checks.
//!
//! ## Usage
//!
//! ```bash
//! # Push a video to one device
//! push-content --client-id android_screen_1f0c... content \
//!   --content-type video --url https://cdn.example.com/promo.mp4 --duration 30
//!
//! # Inline text content
//! push-content --client-id android_screen_1f0c... content \
//!   --content-type text --title "Notice" --text "Closing at 18:00"
//!
//! # Remote command
//! push-content --client-id android_screen_1f0c... command --name reboot --params '{"delay": 5}'
//!
//! # Broadcast to every display
//! push-content broadcast --message "Fire drill at 10:00"
//! ```

use clap::{Parser, Subcommand};
use display_client::config::{DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, DEFAULT_TOPIC_PREFIX};
use display_client::protocol::{
    CLIENT_ID_PREFIX, Command, ContentItem, ContentPush, TopicSet, now_millis,
};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "push-content",
    about = "Publish content, commands or broadcasts to display clients"
)]
struct Args {
    /// Target client id (`android_screen_<deviceId>`); a bare device id is accepted too
    #[arg(long)]
    client_id: Option<String>,

    /// Topic prefix shared with the devices
    #[arg(long, default_value = DEFAULT_TOPIC_PREFIX)]
    prefix: String,

    /// MQTT broker host
    #[arg(long, default_value = DEFAULT_BROKER_HOST)]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = DEFAULT_BROKER_PORT)]
    broker_port: u16,

    #[command(subcommand)]
    message: MessageKind,
}

#[derive(Subcommand)]
enum MessageKind {
    /// Push one content item to a device
    Content {
        /// image, video, text, audio or slideshow
        #[arg(long, default_value = "image")]
        content_type: String,
        #[arg(long, default_value = "Test content")]
        title: String,
        #[arg(long)]
        url: Option<String>,
        /// Inline body for text content
        #[arg(long)]
        text: Option<String>,
        /// Display duration in seconds
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long)]
        priority: Option<i32>,
    },
    /// Send a remote command to a device
    Command {
        #[arg(long)]
        name: String,
        /// Parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
    },
    /// Send raw text to every device
    Broadcast {
        #[arg(long)]
        message: String,
    },
}

fn target_topics(args: &Args) -> Result<TopicSet, Box<dyn std::error::Error>> {
    let client_id = args
        .client_id
        .as_deref()
        .ok_or("--client-id is required for content and command messages")?;
    let client_id = if client_id.starts_with(CLIENT_ID_PREFIX) {
        client_id.to_string()
    } else {
        format!("{CLIENT_ID_PREFIX}{client_id}")
    };
    Ok(TopicSet::derive(&args.prefix, &client_id))
}

fn build_message(args: &Args) -> Result<(String, Vec<u8>), Box<dyn std::error::Error>> {
    match &args.message {
        MessageKind::Content {
            content_type,
            title,
            url,
            text,
            duration,
            priority,
        } => {
            let push = ContentPush {
                message_type: Some("content_push".to_string()),
                content: ContentItem {
                    id: Uuid::new_v4().to_string(),
                    title: title.clone(),
                    content_type: content_type.clone(),
                    url: url.clone(),
                    content: text.clone(),
                    duration: *duration,
                    size: None,
                    priority: *priority,
                    description: None,
                },
                schedule: None,
            };
            Ok((target_topics(args)?.content, serde_json::to_vec(&push)?))
        }
        MessageKind::Command { name, params } => {
            let params = match params {
                Some(raw) => serde_json::from_str::<Value>(raw)?,
                None => Value::Null,
            };
            let command = Command {
                command: name.clone(),
                params,
                timestamp: Some(now_millis()),
            };
            Ok((target_topics(args)?.command, serde_json::to_vec(&command)?))
        }
        MessageKind::Broadcast { message } => {
            let topics = TopicSet::derive(&args.prefix, "");
            Ok((topics.broadcast, message.clone().into_bytes()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (topic, payload) = match build_message(&args) {
        Ok(message) => message,
        Err(e) => {
            eprintln!("✗ {e}");
            std::process::exit(1);
        }
    };

    let mut options = MqttOptions::new(
        format!("push-content-{}", Uuid::new_v4().simple()),
        args.broker_host.as_str(),
        args.broker_port,
    );
    options.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(options, 10);

    println!(
        "Connecting to MQTT broker {}:{}...",
        args.broker_host, args.broker_port
    );
    client
        .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
        .await?;

    // Drive the event loop until the broker acknowledges the publish
    let acked = timeout(Duration::from_secs(10), async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    })
    .await;

    match acked {
        Ok(Ok(())) => println!("✓ Published to {topic}"),
        Ok(Err(e)) => {
            eprintln!("✗ MQTT error: {e}");
            std::process::exit(1);
        }
        Err(_) => {
            eprintln!("✗ Timed out waiting for broker acknowledgement");
            std::process::exit(1);
        }
    }

    client.disconnect().await?;
    Ok(())
}
