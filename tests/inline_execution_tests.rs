//! Inline pipeline built from the collection and applied to a session

mod common;

use cim_projections::{
    DocumentType, InMemoryDocumentSession, InMemoryDocumentStore, Projection,
    ProjectionCollection, ProjectionLifecycle, StoredEvent,
};
use common::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[tokio::test]
async fn inline_projections_write_documents() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::default();
    let mut projections = ProjectionCollection::for_store(&store);
    projections.add_event_projection(customer_invoices(), None)?;
    projections.self_aggregate::<Invoice>(None)?;
    projections.assert_validity(&store)?;

    let session = InMemoryDocumentSession::new();
    let invoice_id = Uuid::new_v4();
    let mut events = invoice_stream(invoice_id);
    events.push(StoredEvent::new(InvoicePaid { invoice_id }, 4));

    for projection in projections.build_inline_projections(&store)? {
        projection.apply(&session, &events).await?;
    }

    assert_eq!(
        session
            .load_as::<CustomerInvoice>(&invoice_id.to_string())
            .await?,
        Some(CustomerInvoice {
            customer: "acme".to_string()
        })
    );
    assert_eq!(
        session.load_as::<Invoice>(&invoice_id.to_string()).await?,
        Some(Invoice {
            customer: "acme".to_string(),
            total: 42,
            paid: true,
        })
    );
    Ok(())
}

#[tokio::test]
async fn voided_invoice_documents_are_removed() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::default();
    let mut projections = ProjectionCollection::for_store(&store);
    projections.add_event_projection(customer_invoices(), None)?;
    projections.self_aggregate::<Invoice>(None)?;

    let session = InMemoryDocumentSession::new();
    let invoice_id = Uuid::new_v4();
    let inline = projections.build_inline_projections(&store)?;

    for projection in &inline {
        projection.apply(&session, &invoice_stream(invoice_id)).await?;
    }
    let voided = [StoredEvent::new(InvoiceVoided { invoice_id }, 4)];
    for projection in &inline {
        projection.apply(&session, &voided).await?;
    }

    assert_eq!(session.count(&DocumentType::of::<Invoice>()).await, 0);
    assert_eq!(
        session.count(&DocumentType::of::<CustomerInvoice>()).await,
        0
    );
    Ok(())
}

#[tokio::test]
async fn inline_projections_run_in_registration_order() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::default();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut projections = ProjectionCollection::for_store(&store);
    for (label, lifecycle) in [
        ("Third", ProjectionLifecycle::Inline),
        ("Background", ProjectionLifecycle::Async),
        ("First", ProjectionLifecycle::Inline),
        ("Second", ProjectionLifecycle::Inline),
    ] {
        projections.add(
            Arc::new(Recorder::new(label, Arc::clone(&log))),
            lifecycle,
            None,
            None,
        )?;
    }

    let session = InMemoryDocumentSession::new();
    for projection in projections.build_inline_projections(&store)? {
        projection.apply(&session, &[]).await?;
    }

    assert_eq!(*log.lock().unwrap(), vec!["Third", "First", "Second"]);
    Ok(())
}

proptest! {
    #[test]
    fn inline_order_matches_registration(lifecycles in prop::collection::vec(any::<bool>(), 0..12)) {
        let store = InMemoryDocumentStore::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut projections = ProjectionCollection::for_store(&store);
        let mut expected = Vec::new();

        for (index, inline) in lifecycles.iter().enumerate() {
            let label = format!("P{index}");
            let lifecycle = if *inline {
                expected.push(label.clone());
                ProjectionLifecycle::Inline
            } else {
                ProjectionLifecycle::Async
            };
            projections
                .add(Arc::new(Recorder::new(label, Arc::clone(&log))), lifecycle, None, None)
                .unwrap();
        }

        let names: Vec<String> = projections
            .build_inline_projections(&store)
            .unwrap()
            .iter()
            .map(|projection| projection.projection_name())
            .collect();
        prop_assert_eq!(names, expected);
        prop_assert_eq!(projections.len(), lifecycles.len());
    }
}

#[tokio::test]
async fn built_projections_are_shared_between_sessions() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::default();
    let mut projections = ProjectionCollection::for_store(&store);
    projections.self_aggregate::<Invoice>(None)?;
    let inline = projections.build_inline_projections(&store)?;

    let sessions: Vec<(Uuid, InMemoryDocumentSession)> = (0..4)
        .map(|_| (Uuid::new_v4(), InMemoryDocumentSession::new()))
        .collect();

    let results = futures::future::join_all(sessions.iter().map(|(invoice_id, session)| {
        let projection = Arc::clone(&inline[0]);
        async move {
            projection
                .apply(session, &invoice_stream(*invoice_id))
                .await
        }
    }))
    .await;
    assert!(results.iter().all(Result::is_ok));

    for (invoice_id, session) in &sessions {
        let invoice = session.load_as::<Invoice>(&invoice_id.to_string()).await?;
        assert_eq!(invoice.map(|i| i.total), Some(42));
    }
    Ok(())
}
