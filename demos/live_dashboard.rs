use dashboard_net::channel::{LifecycleEvent, TypingIndicator};
use dashboard_net::messaging::{ClientEvent, EventFilter, InboundEvent};
use dashboard_net::{
    ActivityFeed, AnalyticsStream, ApiClient, NetworkConfig, PresenceChannel, RealtimeClient,
    RealtimeClientOptions,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=dashboard_net=debug for connection details
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = NetworkConfig::from_env()?;
    let tokens = config.token_store()?;

    let mut api = ApiClient::builder(&config.api_base_url)?
        .token_store(tokens.clone())
        .retry_policy(config.retry_policy())
        .timeout(config.request_timeout());
    if let Some(key) = &config.api_key {
        api = api.api_key(key.clone());
    }
    let api = api.build();

    let me: Value = api.get("auth/me").await?;
    let user_id = me["id"].as_str().unwrap_or("anonymous").to_string();
    println!("Signed in as {user_id}");

    let client = RealtimeClient::new(
        &config.ws_url,
        RealtimeClientOptions {
            user_id: Some(user_id.clone()),
            ..config.realtime_options()
        },
    )?;

    let mut lifecycle = client.on(EventFilter::Lifecycle).await;
    tokio::spawn(async move {
        while let Some(event) = lifecycle.recv().await {
            match event {
                ClientEvent::Reconnecting { attempt, delay_ms } => {
                    println!("Reconnecting (attempt {attempt}) in {delay_ms}ms");
                }
                ClientEvent::ReconnectFailed { attempts } => {
                    println!("Gave up after {attempts} attempts");
                }
                other => println!("Connection: {other:?}"),
            }
        }
    });

    let mut notifications = client
        .on(dashboard_net::MessageKind::Notification)
        .await;
    tokio::spawn(async move {
        while let Some(ClientEvent::Message(InboundEvent::Notification(n))) =
            notifications.recv().await
        {
            println!("[{}] {}", n.severity, n.message);
        }
    });

    let feed = ActivityFeed::default();
    feed.attach(&client).await;
    let analytics = AnalyticsStream::new();
    analytics.attach(&client).await;

    client
        .connect(tokens.access_token().unwrap_or_default())
        .await?;
    client.subscribe("workspace").await?;

    let presence = PresenceChannel::new(client.clone(), user_id);
    presence.start(Duration::from_secs(30)).await?;
    presence.set_page("/content").await?;

    let typing = TypingIndicator::new(presence.clone(), "content:draft");
    typing.keystroke().await?;

    client
        .send("content_update", json!({ "contentId": "draft", "action": "edited" }))
        .await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("{} peers online", presence.peers().len());
                for entry in feed.entries().iter().take(5) {
                    println!("  {}", entry.summary);
                }
                for sample in analytics.snapshot() {
                    println!("  {} = {}", sample.metric, sample.value);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    typing.stop().await?;
    presence.handle_lifecycle(LifecycleEvent::Unload).await?;
    client.disconnect().await?;
    println!("Disconnected");
    Ok(())
}
