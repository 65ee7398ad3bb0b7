use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::OrmConn,
    domain::{cart::ShippingPolicy, delivery::DeliveryPolicy},
    integrations::{
        mailer::{LogMailer, Mailer, SmtpMailer},
        payment::{DisabledGateway, IyzicoGateway, PaymentGateway},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(
        orm: OrmConn,
        config: AppConfig,
        mailer: Arc<dyn Mailer>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            orm,
            config: Arc::new(config),
            mailer,
            payments,
        }
    }

    /// Wires SMTP and iyzico when configured, falling back to the log mailer
    /// and a disabled gateway otherwise.
    pub fn from_config(orm: OrmConn, config: AppConfig) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => {
                tracing::warn!("SMTP_HOST not set, emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        let payments: Arc<dyn PaymentGateway> = match &config.iyzico {
            Some(iyzico) => Arc::new(IyzicoGateway::new(iyzico.clone())?),
            None => {
                tracing::warn!("IYZICO_API_KEY not set, card payments are disabled");
                Arc::new(DisabledGateway)
            }
        };

        Ok(Self::new(orm, config, mailer, payments))
    }

    pub fn shipping_policy(&self) -> ShippingPolicy {
        ShippingPolicy {
            flat_fee: self.config.shipping_fee,
            free_threshold: self.config.free_shipping_threshold,
        }
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            lead_minutes: self.config.same_day_lead_minutes,
            max_days_ahead: self.config.max_delivery_days_ahead,
        }
    }
}
