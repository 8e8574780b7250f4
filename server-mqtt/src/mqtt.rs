//! Connects the gateway to the broker with rumqttc.
//!
//! Inbound publishes go to [`Gateway::handle_message`]. The outbox is drained
//! by its own task so a slow broker never blocks the event loop.

use std::time::Duration;

use anyhow::Result;
use common::{topics::GATEWAY_WILL_TOPIC, GatewayInit, Topics};
use matter_gateway::{
    outbox::{OutboundMessage, QoS},
    Gateway,
};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet};
use tokio::{sync::mpsc::UnboundedReceiver, time};
use tracing::{debug, error, info, warn};

use crate::config::BrokerSettings;

const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

fn qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// What the broker publishes for us if we drop off
fn will_payload(mac: &str) -> Result<Vec<u8>> {
    let will = GatewayInit {
        power_on: false,
        gw_mac: mac.to_string(),
    };
    Ok(serde_json::to_vec(&will)?)
}

pub fn options(settings: &BrokerSettings, topics: &Topics) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(settings.keep_alive);
    options.set_clean_session(settings.clean_session);
    if let Some((username, password)) = &settings.credentials {
        options.set_credentials(username, password);
    }
    options.set_last_will(LastWill::new(
        GATEWAY_WILL_TOPIC,
        will_payload(topics.mac())?,
        rumqttc::QoS::AtLeastOnce,
        false,
    ));
    Ok(options)
}

pub struct MqttBridge {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
}

impl MqttBridge {
    pub fn new(settings: &BrokerSettings, topics: Topics) -> Result<Self> {
        let (client, eventloop) = AsyncClient::new(options(settings, &topics)?, REQUEST_CAPACITY);
        Ok(Self {
            client,
            eventloop,
            topics,
        })
    }

    /// Poll the connection until the task is dropped, reconnecting after errors
    pub async fn run(self, gateway: Gateway, outbox: UnboundedReceiver<OutboundMessage>) {
        let Self {
            client,
            mut eventloop,
            topics,
        } = self;
        spawn_publisher(client.clone(), outbox);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(code = ?ack.code, "connected to broker");
                    // Subscribing awaits the request channel, which this loop drains
                    let client = client.clone();
                    let filters = topics.subscriptions();
                    tokio::spawn(async move {
                        for filter in filters {
                            let subscribed = client.subscribe(&filter, rumqttc::QoS::AtLeastOnce);
                            if let Err(e) = subscribed.await {
                                error!(%filter, error = %e, "subscribe failed");
                            }
                        }
                    });
                    gateway.publish_init();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, len = publish.payload.len(), "received");
                    gateway.handle_message(&publish.topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "broker connection lost, retrying");
                    time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

fn spawn_publisher(client: AsyncClient, mut outbox: UnboundedReceiver<OutboundMessage>) {
    tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let topic = message.topic.clone();
            if let Err(e) = client
                .publish(message.topic, qos(message.qos), message.retain, message.payload)
                .await
            {
                warn!(%topic, error = %e, "publish failed");
            }
        }
        debug!("outbox closed");
    });
}
