// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Session runtime: owns the workflow model and a worker pool that executes
//! commands off the update path.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::logic::{GeminiExtractor, NhtsaDecoder, WebhookCompliance};
use crate::mvu::{self, AppModel, Command, Msg, Services};
use crate::store::open_store;

impl Services {
    /// Production services built from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            decoder: Box::new(NhtsaDecoder::new(
                &config.decode_base_url,
                config.http_timeout,
                config.retry,
            )),
            extractor: Box::new(GeminiExtractor::new(
                &config.gemini_base_url,
                &config.gemini_model,
                config.gemini_api_key.clone(),
                config.http_timeout,
            )),
            compliance: Box::new(WebhookCompliance::new(
                config.compliance_webhook.clone(),
                config.http_timeout,
            )),
            store: open_store(config),
            owner: config.owner.clone(),
        }
    }
}

/// One operator's workflow with its command workers.
pub struct Session {
    model: AppModel,
    services: Arc<Services>,
    cmd_tx: Option<Sender<Command>>,
    msg_rx: Receiver<Msg>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(services: Services) -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get().clamp(2, 4))
            .unwrap_or(2);
        Self::with_workers(services, threads)
    }

    pub fn with_workers(services: Services, threads: usize) -> Self {
        let services = Arc::new(services);
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Command>();
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded::<Msg>();

        let workers = (0..threads.max(1))
            .map(|_| {
                let cmd_rx = cmd_rx.clone();
                let msg_tx = msg_tx.clone();
                let services = Arc::clone(&services);
                thread::spawn(move || {
                    for cmd in cmd_rx.iter() {
                        debug!(?cmd, "running command");
                        let msg = mvu::run_command(cmd, &services);
                        let _ = msg_tx.send(msg);
                    }
                })
            })
            .collect();

        Self {
            model: AppModel::default(),
            services,
            cmd_tx: Some(cmd_tx),
            msg_rx,
            workers,
        }
    }

    pub fn model(&self) -> &AppModel {
        &self.model
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Apply `msg` and hand any resulting commands to the workers.
    pub fn dispatch(&mut self, msg: Msg) {
        let mut cmds = Vec::new();
        mvu::update(&mut self.model, msg, &mut cmds);
        for cmd in cmds {
            let sent = self
                .cmd_tx
                .as_ref()
                .is_some_and(|tx| tx.send(cmd).is_ok());
            if sent {
                self.model.pending_commands += 1;
            } else {
                warn!("command workers stopped; dropping command");
                mvu::surface_event(
                    &mut self.model,
                    "Background workers are not running.".to_string(),
                    true,
                );
            }
        }
    }

    /// Apply every message that is already waiting, without blocking.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.model.pending_commands = self.model.pending_commands.saturating_sub(1);
            self.dispatch(msg);
            applied += 1;
        }
        applied
    }

    /// Block until every outstanding command, including follow-ups, has completed.
    pub fn settle(&mut self) {
        while self.model.pending_commands > 0 {
            match self.msg_rx.recv() {
                Ok(msg) => {
                    self.model.pending_commands -= 1;
                    self.dispatch(msg);
                }
                Err(_) => break,
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Closing the command channel ends the worker loops.
        self.cmd_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
