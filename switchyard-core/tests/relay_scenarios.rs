//! End-to-end behaviour of an actor: subscribe over the command endpoint,
//! relay live batches, hydrate new subscribers.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{
    hydrate_fn, Actor, Command, CommandKind, Document, RecordingChannel, SchemaTypeConfig,
};

fn actor() -> (Actor, Arc<RecordingChannel>) {
    let channel = Arc::new(RecordingChannel::new());
    let actor = Actor::builder("forms")
        .endpoint("http://forms.local")
        .token("forms-token")
        .channel(channel.clone())
        .build();
    actor.register("form", SchemaTypeConfig::new().allow_subscribe(true).webhook(true));
    actor.register("order", SchemaTypeConfig::new().allow_subscribe(true).webhook(true));
    (actor, channel)
}

fn subscribe(webhook: &str, schema_type: &str, query: Option<Value>) -> Document {
    let mut params = json!({"webhook": webhook, "schemaType": schema_type});
    if let Some(query) = query {
        params["query"] = query;
    }
    Command::new("subscribe", params, "peer").to_document()
}

fn docs(value: Value) -> Vec<Document> {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_open_form_scenario() {
    let (actor, channel) = actor();
    actor
        .dispatch("command", vec![subscribe("http://w", "form", Some(json!({"status": "open"})))])
        .await
        .unwrap();

    actor
        .dispatch(
            "form",
            docs(json!([
                {"schemaType": "form", "id": 1, "status": "open"},
                {"schemaType": "form", "id": 2, "status": "closed"}
            ])),
        )
        .await
        .unwrap();

    let deliveries = channel.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].url, "http://w");
    assert_eq!(
        deliveries[0].documents,
        docs(json!([{"schemaType": "form", "id": 1, "status": "open"}]))
    );
}

#[tokio::test]
async fn test_resubscribe_moves_webhook_to_new_type() {
    let (actor, channel) = actor();
    actor
        .dispatch(
            "command",
            vec![subscribe("http://w", "form", None), subscribe("http://w", "order", None)],
        )
        .await
        .unwrap();

    let subscriptions = actor.subscriptions();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions["http://w"].schema_type(), "order");

    actor
        .dispatch("form", docs(json!([{"schemaType": "form", "id": 1}])))
        .await
        .unwrap();
    assert!(channel.is_empty());

    actor
        .dispatch("order", docs(json!([{"schemaType": "order", "id": 7}])))
        .await
        .unwrap();
    assert_eq!(channel.deliveries_to("http://w").len(), 1);
}

#[tokio::test]
async fn test_two_queries_split_one_batch() {
    let (actor, channel) = actor();
    actor
        .dispatch(
            "command",
            vec![
                subscribe("http://small", "order", Some(json!({"qty": {"$lt": 10}}))),
                subscribe("http://big", "order", Some(json!({"qty": {"$gte": 10}}))),
                subscribe("http://none", "order", Some(json!({"qty": {"$gt": 1000}}))),
            ],
        )
        .await
        .unwrap();

    let batch = docs(json!([
        {"schemaType": "order", "id": 1, "qty": 3},
        {"schemaType": "order", "id": 2, "qty": 30},
        {"schemaType": "order", "id": 3, "qty": 5},
        {"schemaType": "order", "id": 4, "qty": 50}
    ]));
    actor.dispatch("order", batch.clone()).await.unwrap();

    let small = channel.deliveries_to("http://small");
    let big = channel.deliveries_to("http://big");
    assert_eq!(small[0].documents, vec![batch[0].clone(), batch[2].clone()]);
    assert_eq!(big[0].documents, vec![batch[1].clone(), batch[3].clone()]);
    assert!(channel.deliveries_to("http://none").is_empty());
}

#[tokio::test]
async fn test_command_events_follow_batch_order() {
    let (actor, _) = actor();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    actor.on_command(move |command| {
        let label = match command.kind()? {
            CommandKind::Subscribe(params) => format!("subscribe:{}", params.webhook),
            CommandKind::Advertise(params) => format!("advertise:{}", params.endpoint),
            CommandKind::Other { command, .. } => command,
        };
        sink.lock().push(label);
        Ok(())
    });

    let batch = vec![
        Command::new("ping", json!({}), "a").to_document(),
        subscribe("http://w", "form", None),
        Command::new("advertise", json!({"endpoint": "http://peer"}), "b").to_document(),
        Command::new("pong", json!(null), "c").to_document(),
    ];
    actor.dispatch("command", batch).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["ping", "subscribe:http://w", "advertise:http://peer", "pong"]
    );
}

#[tokio::test]
async fn test_commands_relay_to_command_subscribers() {
    let channel = Arc::new(RecordingChannel::new());
    let actor = Actor::builder("hub")
        .channel(channel.clone())
        .command_subscriptions(true)
        .build();

    actor
        .dispatch("command", vec![subscribe("http://audit", "command", None)])
        .await
        .unwrap();
    assert!(channel.is_empty());

    let ping = Command::new("ping", json!({}), "x").to_document();
    actor.dispatch("command", vec![ping.clone()]).await.unwrap();

    let audit = channel.deliveries_to("http://audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].documents, vec![ping]);
}

#[tokio::test]
async fn test_hydration_reaches_only_new_subscriber() {
    let channel = Arc::new(RecordingChannel::new());
    let actor = Actor::builder("forms").channel(channel.clone()).build();
    actor.register(
        "form",
        SchemaTypeConfig::new()
            .allow_subscribe(true)
            .hydrate(hydrate_fn(|_| async {
                Ok(docs(json!([
                    {"schemaType": "form", "id": 1, "status": "open"},
                    {"schemaType": "form", "id": 2, "status": "closed"},
                    {"schemaType": "form", "id": 3, "status": "open"}
                ])))
            })),
    );

    actor
        .dispatch("command", vec![subscribe("http://old", "form", None)])
        .await
        .unwrap();

    let mut request = subscribe("http://new", "form", Some(json!({"status": "open"})));
    request = Document::from_value({
        let mut value = request.into_value();
        value["params"]["hydrate"] = json!(true);
        value
    })
    .unwrap();
    actor.dispatch("command", vec![request]).await.unwrap();

    assert!(channel.wait_for(1, Duration::from_secs(2)).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let deliveries = channel.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].url, "http://new");
    let ids: Vec<&Value> = deliveries[0]
        .documents
        .iter()
        .filter_map(|d| d.get("id"))
        .collect();
    assert_eq!(ids, vec![&json!(1), &json!(3)]);
    assert!(actor.subscriptions().contains_key("http://new"));
}

#[tokio::test]
async fn test_outbound_round_trip_between_actors() {
    // The first actor's outbound channel records; the second actor consumes
    // what was recorded as if it arrived over HTTP.
    let outbound = Arc::new(RecordingChannel::new());
    let consumer = Actor::builder("consumer")
        .endpoint("http://consumer.local")
        .channel(outbound.clone())
        .build();
    consumer
        .subscribe(
            "http://producer.local",
            switchyard_core::SubscribeParams::for_type("form"),
        )
        .unwrap();

    let (producer, delivered) = actor();
    let request = outbound.deliveries().remove(0);
    assert_eq!(request.url, "http://producer.local/command");
    producer.dispatch("command", request.documents).await.unwrap();

    producer
        .dispatch("form", docs(json!([{"schemaType": "form", "id": 5}])))
        .await
        .unwrap();

    let forwarded = delivered.deliveries();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].url, "http://consumer.local/form");
}
