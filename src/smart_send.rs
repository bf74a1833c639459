//! Fan-out of one logical message across every channel each recipient has
//! configured. Legs run concurrently and fail independently; nothing is
//! rolled back when a sibling leg fails.

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinSet,
};
use tracing::{error, info, warn};

use crate::{
    clients::{ChatBot, ProfileDirectory},
    error::{LegFailure, SmartSendError},
    models::{
        notification::{CreateNotification, SendEmail, SmartSendRequest},
        profile::{Channel, Profile},
    },
    service::NotificationService,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SmartSendReport {
    pub recipients: usize,
    pub attempted: usize,
    pub skipped: usize,
}

/// A leg that passed validation and is ready to run.
#[derive(Debug)]
enum Leg {
    Email { address: String },
    InApp,
    ChatBot { chat_id: i64 },
}

impl Leg {
    fn channel(&self) -> Channel {
        match self {
            Leg::Email { .. } => Channel::Email,
            Leg::InApp => Channel::Notification,
            Leg::ChatBot { .. } => Channel::Telegram,
        }
    }

    /// `None` when the channel cannot be served for this profile.
    fn plan(profile: &Profile, channel: &Channel) -> Option<Self> {
        match channel {
            Channel::Email => match &profile.email {
                Some(address) => Some(Leg::Email {
                    address: address.clone(),
                }),
                None => {
                    warn!(user_id = %profile.id, "Email channel configured without an address");
                    None
                }
            },
            Channel::Notification => Some(Leg::InApp),
            Channel::Telegram => match profile.chat_id() {
                Some(chat_id) => Some(Leg::ChatBot { chat_id }),
                None => {
                    warn!(
                        user_id = %profile.id,
                        chat_ids = ?profile.chat_ids,
                        "Chat id missing or malformed"
                    );
                    None
                }
            },
            Channel::Unknown(name) => {
                warn!(user_id = %profile.id, channel = %name, "Unknown notification channel");
                None
            }
        }
    }
}

pub struct SmartSender {
    service: Arc<NotificationService>,
    directory: Arc<dyn ProfileDirectory>,
    bot: Arc<dyn ChatBot>,
    limiter: Arc<Semaphore>,
}

impl SmartSender {
    pub fn new(
        service: Arc<NotificationService>,
        directory: Arc<dyn ProfileDirectory>,
        bot: Arc<dyn ChatBot>,
        concurrency: usize,
    ) -> Self {
        Self {
            service,
            directory,
            bot,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Delivers `request` to every recipient on every configured channel and
    /// waits for all legs. Fails with the full list of failed legs if any failed.
    pub async fn send(&self, request: SmartSendRequest) -> Result<SmartSendReport, SmartSendError> {
        const OP: &str = "smart_send.send";

        let token = self.directory.access_token().await.map_err(|e| {
            error!(op = OP, error = %e, "Failed to get auth token");
            SmartSendError::Auth(e)
        })?;

        let request = Arc::new(request);
        let failures = Arc::new(Mutex::new(Vec::<LegFailure>::new()));
        let mut legs = JoinSet::new();
        let mut owners = HashMap::new();
        let mut report = SmartSendReport {
            recipients: request.user_ids.len(),
            ..Default::default()
        };

        for user_id in &request.user_ids {
            let profile = match self.directory.profile(&token, user_id).await {
                Ok(profile) => profile,
                Err(e) => {
                    error!(op = OP, user_id = %user_id, error = %e, "Failed to get user");
                    failures.lock().await.push(LegFailure {
                        user_id: user_id.clone(),
                        channel: None,
                        reason: format!("profile lookup failed: {}", e),
                    });
                    continue;
                }
            };

            for channel in &profile.channels {
                let Some(leg) = Leg::plan(&profile, channel) else {
                    report.skipped += 1;
                    continue;
                };

                // Bounds in-flight legs; the permit is released when the leg ends.
                let permit = match Arc::clone(&self.limiter).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        failures.lock().await.push(LegFailure {
                            user_id: user_id.clone(),
                            channel: Some(leg.channel()),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                report.attempted += 1;

                let service = Arc::clone(&self.service);
                let bot = Arc::clone(&self.bot);
                let request = Arc::clone(&request);
                let failures = Arc::clone(&failures);
                let owner = (user_id.clone(), leg.channel());
                let user_id = user_id.clone();

                let handle = legs.spawn(async move {
                    let _permit = permit;
                    let channel = leg.channel();

                    let outcome = match leg {
                        Leg::Email { address } => service
                            .send_message(
                                SendEmail {
                                    subject: request.title.clone(),
                                    body: request.body.clone(),
                                },
                                &address,
                            )
                            .await
                            .map_err(|e| e.to_string()),
                        Leg::InApp => service
                            .create_notification(CreateNotification {
                                user_id: user_id.clone(),
                                subject: request.title.clone(),
                                body: request.body.clone(),
                                custom: request.custom.clone(),
                            })
                            .await
                            .map(|_| ())
                            .map_err(|e| e.to_string()),
                        Leg::ChatBot { chat_id } => bot
                            .send_message(chat_id, &request.title, &request.body)
                            .await
                            .map_err(|e| e.to_string()),
                    };

                    if let Err(reason) = outcome {
                        error!(user_id = %user_id, channel = %channel, error = %reason, "Delivery failed");
                        failures.lock().await.push(LegFailure {
                            user_id,
                            channel: Some(channel),
                            reason,
                        });
                    }
                });
                owners.insert(handle.id(), owner);
            }
        }

        while let Some(joined) = legs.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    owners.remove(&id);
                }
                Err(e) => {
                    let (user_id, channel) = match owners.remove(&e.id()) {
                        Some((user_id, channel)) => (user_id, Some(channel)),
                        None => ("unknown".to_string(), None),
                    };
                    error!(op = OP, user_id = %user_id, error = %e, "Delivery task aborted");
                    failures.lock().await.push(LegFailure {
                        user_id,
                        channel,
                        reason: format!("delivery task aborted: {}", e),
                    });
                }
            }
        }

        let failures = std::mem::take(&mut *failures.lock().await);

        info!(
            op = OP,
            recipients = report.recipients,
            attempted = report.attempted,
            skipped = report.skipped,
            failed = failures.len(),
            "Smart send notifications completed"
        );

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SmartSendError::Partial { failures })
        }
    }
}
