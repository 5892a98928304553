//! MQTT source backed by `rumqttc`
//!
//! `rumqttc` exposes the connection as an event loop that must be polled.
//! The connector drives it until the first ConnAck, then hands it to a
//! background pump task. The pump re-subscribes on every later ConnAck,
//! since reconnects start with a clean session, and pushes publish packets
//! into a queue the session reads from.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, Publish, QoS, Transport,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Adapter, Connector, Delivery, ReceiveSettings, Session, SessionError};
use crate::criteria::CriteriaGroup;

/// Default port for plain MQTT.
pub const DEFAULT_PORT: u16 = 1883;

/// Default port for MQTT over TLS.
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Time allowed for the client to flush its disconnect on close.
const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Pause before polling again after an event loop error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the client request channel and of the publish queue.
const QUEUE_CAPACITY: usize = 10;

fn default_qos() -> u8 {
    0
}

/// MQTT source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSourceConfig {
    /// Broker URL, `mqtt://` or `mqtts://`
    pub url: String,

    /// Client identifier; generated when absent
    #[serde(rename = "clientId", default)]
    pub client_id: Option<String>,

    /// Topic filters subscribed on every connect
    #[serde(default)]
    pub topics: Vec<String>,

    /// Subscription QoS level, 0 to 2
    #[serde(default = "default_qos")]
    pub qos: u8,

    /// Filter applied to every message
    #[serde(default)]
    pub criteria: CriteriaGroup,
}

impl MqttSourceConfig {
    /// Build the connector for this source.
    ///
    /// `index` is the position of the source in the config file, used for
    /// the generated client id.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidUrl` if the URL or QoS cannot be used.
    pub fn connector(&self, index: usize) -> Result<MqttConnector, SessionError> {
        let client_id = match &self.client_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => format!("queuerator-{}-{}", std::process::id(), index),
        };
        Ok(MqttConnector {
            broker: BrokerAddress::parse(&self.url)?,
            client_id,
            topics: self.topics.clone(),
            qos: qos_from_level(self.qos)?,
        })
    }

    /// Build the adapter for this source.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name of the source
    /// * `index` - Position of the source in the config file
    /// * `settings` - Receive loop settings
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidUrl` if the URL or QoS cannot be used.
    pub fn into_adapter(
        self,
        name: String,
        index: usize,
        settings: ReceiveSettings,
    ) -> Result<Adapter<MqttConnector>, SessionError> {
        let connector = self.connector(index)?;
        if self.topics.is_empty() {
            warn!(source = %name, "MQTT source has no topics and will receive nothing");
        }
        Ok(Adapter::new(name, self.criteria, connector, settings))
    }
}

/// Map a numeric QoS level to the client enum.
pub fn qos_from_level(level: u8) -> Result<QoS, SessionError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(SessionError::InvalidUrl(format!(
            "QoS level must be 0, 1 or 2, got {}",
            other
        ))),
    }
}

/// Broker endpoint extracted from an MQTT URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub credentials: Option<(String, String)>,
}

impl BrokerAddress {
    /// Parse `mqtt://[user[:password]@]host[:port]`.
    ///
    /// `mqtts://` and `ssl://` select TLS, `tcp://` is accepted as plain
    /// MQTT. The port defaults to 1883, or 8883 with TLS.
    ///
    /// # Examples
    ///
    /// ```
    /// use queuerator::source::mqtt::BrokerAddress;
    ///
    /// let broker = BrokerAddress::parse("mqtts://broker.local").unwrap();
    /// assert_eq!(broker.port, 8883);
    /// assert!(broker.tls);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let url = Url::parse(raw).map_err(|e| SessionError::InvalidUrl(format!("{}: {}", raw, e)))?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            other => {
                return Err(SessionError::InvalidUrl(format!(
                    "unsupported MQTT scheme '{}'",
                    other
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SessionError::InvalidUrl(format!("{}: missing host", raw)))?
            .to_string();
        let port = url
            .port()
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some((
                url.username().to_string(),
                url.password().unwrap_or_default().to_string(),
            ))
        };

        Ok(Self {
            host,
            port,
            tls,
            credentials,
        })
    }
}

/// Connector creating one MQTT client per session.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    broker: BrokerAddress,
    client_id: String,
    topics: Vec<String>,
    qos: QoS,
}

impl MqttConnector {
    /// Client identifier presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Topic filters this connector subscribes to.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker.host, self.broker.port);
        options.set_manual_acks(true);
        if let Some((username, password)) = &self.broker.credentials {
            options.set_credentials(username, password);
        }
        if self.broker.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

fn subscribe_all(client: &AsyncClient, topics: &[String], qos: QoS) {
    for topic in topics {
        match client.try_subscribe(topic, qos) {
            Ok(()) => info!(topic = %topic, "Subscribed to topic"),
            Err(e) => error!(topic = %topic, error = %e, "Failed to subscribe to topic"),
        }
    }
}

#[async_trait]
impl Connector for MqttConnector {
    type Session = MqttSession;

    async fn connect(&self) -> Result<MqttSession, SessionError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), QUEUE_CAPACITY);

        debug!(
            host = %self.broker.host,
            port = self.broker.port,
            client_id = %self.client_id,
            "Connecting to MQTT broker"
        );
        loop {
            if let Event::Incoming(Incoming::ConnAck(_)) = eventloop.poll().await? {
                break;
            }
        }
        info!("Connected to MQTT broker");
        subscribe_all(&client, &self.topics, self.qos);

        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let pump = tokio::spawn(pump(
            eventloop,
            client.clone(),
            self.topics.clone(),
            self.qos,
            queue_tx,
        ));

        Ok(MqttSession {
            client,
            queue: queue_rx,
            pump,
        })
    }
}

/// Drive the event loop until the client disconnects or the session is gone.
async fn pump(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Vec<String>,
    qos: QoS,
    queue: mpsc::Sender<Result<Publish, SessionError>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("Reconnected to MQTT broker");
                subscribe_all(&client, &topics, qos);
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                if queue.send(Ok(publish)).await.is_err() {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent, stopping event loop");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection lost");
                if queue.send(Err(e.into())).await.is_err() {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
    flush_disconnect(eventloop).await;
}

/// Keep polling after the session is gone so a requested DISCONNECT still
/// reaches the broker. Publishes that arrive meanwhile are left unacked.
async fn flush_disconnect(mut eventloop: EventLoop) {
    let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return true,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Event loop failed while closing");
                    return false;
                }
            }
        }
    })
    .await;
    match flushed {
        Ok(true) => debug!("Disconnect sent, stopping event loop"),
        _ => debug!("Event loop stopped without sending a disconnect"),
    }
}

/// Connected MQTT client with its event loop pump.
pub struct MqttSession {
    client: AsyncClient,
    queue: mpsc::Receiver<Result<Publish, SessionError>>,
    pump: JoinHandle<()>,
}

#[async_trait]
impl Session for MqttSession {
    type Handle = Publish;

    async fn recv(&mut self) -> Result<Delivery<Publish>, SessionError> {
        match self.queue.recv().await {
            Some(Ok(publish)) => {
                let payload = (!publish.payload.is_empty()).then(|| publish.payload.clone());
                Ok(Delivery {
                    payload,
                    handle: publish,
                })
            }
            Some(Err(e)) => Err(e),
            None => Err(SessionError::Closed("MQTT event loop stopped".to_string())),
        }
    }

    async fn accept(&mut self, handle: Publish) -> Result<(), SessionError> {
        self.client.ack(&handle).await?;
        Ok(())
    }

    async fn reject(&mut self, handle: Publish) -> Result<(), SessionError> {
        // No negative acknowledgement in MQTT; ack so the broker stops redelivering.
        self.client.ack(&handle).await?;
        Ok(())
    }

    async fn close(self) -> Result<(), SessionError> {
        let MqttSession {
            client,
            queue,
            mut pump,
        } = self;

        // Queue the DISCONNECT while the pump is still polling, then release
        // a pump blocked on a full queue so it can flush it.
        let disconnected = tokio::time::timeout(DISCONNECT_TIMEOUT, client.disconnect()).await;
        drop(queue);

        if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut pump)
            .await
            .is_err()
        {
            debug!("Event loop did not stop in time, aborting");
            pump.abort();
        }
        match disconnected {
            Ok(result) => Ok(result?),
            Err(_) => Err(SessionError::Closed(
                "disconnect request was not accepted in time".to_string(),
            )),
        }
    }
}
