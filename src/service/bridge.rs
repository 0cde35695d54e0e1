//! Bridge supervisor.
//!
//! Owns one gate connection from connect to teardown:
//!
//! 1. connect (or accept a connection from the caller)
//! 2. log in; nothing else touches the connection until this succeeds
//! 3. split the connection and start the serializer, reader, queue poller and
//!    worker pool
//! 4. wait for the serializer or the reader to stop, then stop everything else
//!
//! There is no reconnect. The returned error says why the connection ended.

use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::codec::Framed;
use tracing::{error, info, instrument};

use crate::config::BridgeConfig;
use crate::core::codec::GateCodec;
use crate::error::{BridgeError, Result};
use crate::protocol::action::ActionRegistry;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::{AuthHandshake, CredentialSource};
use crate::service::pipeline::{poll_queue, spawn_workers, Pipeline};
use crate::service::reader::InboundReader;
use crate::service::sink::CommandSink;
use crate::service::writer::OutboundSerializer;
use crate::transport::queue::MessageQueue;
use crate::transport::tcp;
use crate::utils::metrics::{spawn_reporter, Metrics};

pub struct Bridge {
    config: BridgeConfig,
    registry: Arc<ActionRegistry>,
    dispatcher: Arc<Dispatcher>,
    credentials: Arc<dyn CredentialSource>,
    queue: Arc<dyn MessageQueue>,
    sink: Arc<dyn CommandSink>,
    metrics: Arc<Metrics>,
}

impl Bridge {
    /// Standard actions, the chat relay handler, and credentials from `config`.
    pub fn new(
        config: BridgeConfig,
        queue: Arc<dyn MessageQueue>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        let credentials = Arc::new(config.credentials.clone());
        Self {
            config,
            registry: Arc::new(ActionRegistry::standard()),
            dispatcher: Arc::new(Dispatcher::with_defaults()),
            credentials,
            queue,
            sink,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn with_credentials<C>(mut self, credentials: C) -> Self
    where
        C: CredentialSource + 'static,
    {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Connect to the configured gate address and run until the connection ends.
    pub async fn run(&self) -> Result<()> {
        let framed = tcp::connect(&self.config.gate.address, self.config.gate.connect_timeout).await?;
        self.run_on(framed).await
    }

    /// Run over an already established connection.
    #[instrument(skip_all)]
    pub async fn run_on<T>(&self, mut framed: Framed<T, GateCodec>) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.metrics.connection_established();
        let credentials = self.credentials.credentials()?;

        self.metrics.handshake_attempt();
        let auth = match AuthHandshake::new(credentials).run(&mut framed).await {
            Ok(auth) => {
                self.metrics.handshake_success();
                auth
            }
            Err(e) => {
                self.metrics.handshake_failed();
                error!(error = %e, "Gate login failed");
                return Err(e);
            }
        };

        let dispatch = &self.config.dispatch;
        let (sink, stream) = framed.split();

        let (outbound, mut writer) = OutboundSerializer::spawn(
            &auth,
            sink,
            dispatch.outbound_capacity,
            dispatch.write_error_policy,
            self.metrics.clone(),
        );

        let mut reader = InboundReader::new(
            &auth,
            stream,
            self.dispatcher.clone(),
            self.sink.clone(),
            self.metrics.clone(),
        )
        .with_max_protocol_errors(self.config.gate.max_protocol_errors)
        .with_event_backlog(dispatch.event_backlog)
        .spawn();

        let (tx, rx) = mpsc::channel(self.config.queue.channel_capacity.max(1));
        let poller = tokio::spawn(poll_queue(
            self.queue.clone(),
            tx,
            self.config.queue.poll_backoff,
            self.metrics.clone(),
        ));

        let pipeline = Pipeline::new(
            self.registry.clone(),
            outbound,
            self.queue.clone(),
            self.metrics.clone(),
        )
        .ack_unknown_actions(dispatch.ack_unknown_actions);
        let workers = spawn_workers(pipeline, rx, dispatch.workers);
        let reporter = spawn_reporter(self.metrics.clone(), dispatch.metrics_interval);

        info!(
            workers = dispatch.workers,
            queue = %self.config.queue.name,
            "Bridge running"
        );

        let result = tokio::select! {
            r = &mut writer => joined("outbound serializer", r),
            r = &mut reader => joined("inbound reader", r),
        };

        poller.abort();
        for worker in &workers {
            worker.abort();
        }
        if let Some(reporter) = &reporter {
            reporter.abort();
        }
        writer.abort();
        reader.abort();

        self.metrics.log_metrics();
        match &result {
            Ok(()) => info!("Bridge stopped"),
            Err(e) => error!(error = %e, "Bridge stopped"),
        }
        result
    }
}

fn joined(task: &str, result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    result.map_err(|e| BridgeError::Custom(format!("{task} task failed: {e}")))?
}
