//! Subcommand implementations.

use anyhow::Result;
use colored::Colorize;
use futures::StreamExt;
use hubcap::{Hubcap, ListenOptions, Message, Order, SubscriptionEvent};
use tracing::debug;

/// Message content from the command line: JSON if it parses, else a string.
pub fn parse_content(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn print_message(message: &Message) {
    let when = message
        .timestamp
        .to_datetime()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| message.timestamp.to_string());
    println!("{} {}", when.dimmed(), message.content);
}

pub async fn publish(client: &Hubcap, channel: &str, content: &str) -> Result<()> {
    let message = client.publish(channel, parse_content(content)).await?;
    println!(
        "{} published to {} at {}",
        "✓".green(),
        channel.bold(),
        message.timestamp
    );
    Ok(())
}

pub async fn poll(client: &Hubcap, name: &str, channels: &[String], order: Order) -> Result<()> {
    let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
    let subscription = client.subscription(name, &channels).await?;
    let messages = subscription
        .poll(ListenOptions::new().order_by(order))
        .await?;

    if messages.is_empty() {
        println!("{}", "no messages".dimmed());
    }
    for message in &messages {
        print_message(message);
    }
    Ok(())
}

pub async fn listen(
    client: &Hubcap,
    name: &str,
    channels: &[String],
    order: Order,
    timeout: u64,
) -> Result<()> {
    let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
    let subscription = client.subscription(name, &channels).await?;
    let mut listener = subscription.listen();
    subscription.start_listening(ListenOptions::new().order_by(order).timeout(timeout));

    println!(
        "{} listening on {} (Ctrl+C to stop)",
        "→".cyan(),
        name.bold()
    );

    loop {
        tokio::select! {
            event = listener.next() => match event {
                Some(SubscriptionEvent::Message(message)) => print_message(&message),
                Some(SubscriptionEvent::Messages(batch)) => {
                    debug!(count = batch.len(), "batch received");
                }
                Some(SubscriptionEvent::Error(e)) => {
                    eprintln!("{} {}", "error:".red(), e);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscription.stop_listening();
    Ok(())
}

pub async fn channels(client: &Hubcap) -> Result<()> {
    for channel in client.channels().await? {
        println!("{}", channel.name);
    }
    Ok(())
}
