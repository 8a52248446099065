// Copyright 2025 Cowboy AI, LLC.

//! Shared fixtures: an invoice aggregate, its events and a few projections

#![allow(dead_code)]

use async_trait::async_trait;
use cim_projections::{
    Aggregate, AggregateProjection, DocumentSession, DomainEvent, EventProjection, Projection,
    ProjectionResult, StoredEvent,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

macro_rules! invoice_event {
    ($name:ident) => {
        impl DomainEvent for $name {
            fn aggregate_id(&self) -> Uuid {
                self.invoice_id
            }

            fn event_type(&self) -> &'static str {
                stringify!($name)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct InvoiceCreated {
    pub invoice_id: Uuid,
    pub customer: String,
}

#[derive(Debug, Clone)]
pub struct LineAdded {
    pub invoice_id: Uuid,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct InvoicePaid {
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct InvoiceVoided {
    pub invoice_id: Uuid,
}

invoice_event!(InvoiceCreated);
invoice_event!(LineAdded);
invoice_event!(InvoicePaid);
invoice_event!(InvoiceVoided);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub customer: String,
    pub total: u64,
    pub paid: bool,
}

impl Aggregate for Invoice {
    fn configure(projection: &mut AggregateProjection<Self>) {
        projection
            .create_with::<InvoiceCreated, _>(|e| Invoice {
                customer: e.customer.clone(),
                total: 0,
                paid: false,
            })
            .apply::<LineAdded, _>(|invoice, e| invoice.total += e.amount)
            .apply::<InvoicePaid, _>(|invoice, _| invoice.paid = true)
            .delete_on::<InvoiceVoided>();
    }
}

/// An aggregate whose declared handlers can never create it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub balance: u64,
}

impl Aggregate for Ledger {
    fn configure(projection: &mut AggregateProjection<Self>) {
        projection.apply::<LineAdded, _>(|ledger, e| ledger.balance += e.amount);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInvoice {
    pub customer: String,
}

pub fn customer_invoices() -> EventProjection {
    EventProjection::new("CustomerInvoices")
        .project::<InvoiceCreated, _>(|event, _, operations| {
            operations.store(
                event.invoice_id.to_string(),
                &CustomerInvoice {
                    customer: event.customer.clone(),
                },
            )
        })
        .project::<InvoiceVoided, _>(|event, _, operations| {
            operations.delete::<CustomerInvoice>(event.invoice_id.to_string());
            Ok(())
        })
}

/// Projection that records the order in which projections see each batch
pub struct Recorder {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new(label: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }
}

#[async_trait]
impl Projection for Recorder {
    fn projection_name(&self) -> String {
        self.label.clone()
    }

    async fn apply(
        &self,
        _session: &dyn DocumentSession,
        _events: &[StoredEvent],
    ) -> ProjectionResult<()> {
        self.log.lock().unwrap().push(self.label.clone());
        Ok(())
    }
}

/// Projection that does nothing
pub struct AuditTrail;

#[async_trait]
impl Projection for AuditTrail {
    async fn apply(
        &self,
        _session: &dyn DocumentSession,
        _events: &[StoredEvent],
    ) -> ProjectionResult<()> {
        Ok(())
    }
}

pub fn invoice_stream(invoice_id: Uuid) -> Vec<StoredEvent> {
    vec![
        StoredEvent::new(
            InvoiceCreated {
                invoice_id,
                customer: "acme".to_string(),
            },
            1,
        ),
        StoredEvent::new(
            LineAdded {
                invoice_id,
                amount: 40,
            },
            2,
        ),
        StoredEvent::new(
            LineAdded {
                invoice_id,
                amount: 2,
            },
            3,
        ),
    ]
}
