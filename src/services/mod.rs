//! Business logic services

pub mod coordinator;
pub mod email;
pub mod loans;
pub mod notifications;
pub mod reservations;

use std::sync::Arc;

use crate::{
    config::{CirculationConfig, EmailConfig},
    repository::Repository,
};

use notifications::{EmailNotifier, HoldNotifier, LogNotifier, NotificationDispatcher};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub coordinator: coordinator::TransitionCoordinator,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
}

impl Services {
    /// Wire the circulation services around one notification transport
    pub fn new(
        repository: Repository,
        circulation: CirculationConfig,
        notifier: Arc<dyn HoldNotifier>,
    ) -> Self {
        let coordinator =
            coordinator::TransitionCoordinator::new(repository.clone(), circulation.hold_period());
        let dispatcher = NotificationDispatcher::new(notifier);

        Self {
            loans: loans::LoansService::new(
                repository.clone(),
                coordinator.clone(),
                dispatcher.clone(),
                circulation,
            ),
            reservations: reservations::ReservationsService::new(
                repository.clone(),
                coordinator.clone(),
                dispatcher,
            ),
            coordinator,
            repository,
        }
    }

    /// Pick the transport from configuration: SMTP when enabled, logging otherwise
    pub fn notifier_from_config(repository: &Repository, email: &EmailConfig) -> Arc<dyn HoldNotifier> {
        if email.enabled {
            Arc::new(EmailNotifier::new(
                repository.clone(),
                email::EmailService::new(email.clone()),
            ))
        } else {
            Arc::new(LogNotifier)
        }
    }
}
