//! Lead Record Store against a real (in-memory) database.

use adnexum::error::CrmError;
use adnexum::lead_store::{LeadPatch, MOVE_FOLLOW_UP_DAYS};
use adnexum::models::lead_interaction;
use adnexum::pipeline::stages::WON;
use adnexum::realtime::{ChangeEvent, LeadCache};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

mod test_utils;
use test_utils::{lead_store, new_lead, new_lead_with_phone, setup_test_db, test_config};

#[tokio::test]
async fn create_applies_pipeline_defaults() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();

    let lead = store.create(user, new_lead("  Panadería Sol  ")).await?;

    assert_eq!(lead.business_name, "Panadería Sol");
    assert_eq!(lead.estado_actual, "nuevo_lead");
    assert_eq!(lead.contador_seguimientos, 0);
    assert_eq!(lead.follow_up_interval_days, 3);
    assert!(lead.seguimiento_activo);
    assert!(!lead.seguido_hoy);
    let today = Utc::now().date_naive();
    assert_eq!(
        lead.fecha_proximo_followup,
        Some(today + Duration::days(MOVE_FOLLOW_UP_DAYS))
    );
    assert_eq!(store.get(user, lead.id).await?.id, lead.id);
    Ok(())
}

#[tokio::test]
async fn create_rejects_blank_name_and_negative_amounts() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();

    let err = store.create(user, new_lead("   ")).await.unwrap_err();
    assert!(matches!(err, CrmError::Validation { field: Some("business_name"), .. }));

    let mut negative = new_lead("Kiosco");
    negative.monto_propuesta = Some(-10.0);
    let err = store.create(user, negative).await.unwrap_err();
    assert!(matches!(err, CrmError::Validation { field: Some("monto_propuesta"), .. }));

    assert!(store.list(user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn leads_are_invisible_to_other_users() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let lead = store.create(owner, new_lead("Taller Norte")).await?;

    assert!(store.list(stranger).await?.is_empty());
    assert!(matches!(
        store.get(stranger, lead.id).await,
        Err(CrmError::NotFound { entity: "lead", .. })
    ));
    assert!(store.remove(stranger, lead.id).await.is_err());
    assert_eq!(store.list(owner).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn move_records_history_and_interaction() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let lead = store.create(user, new_lead("Gimnasio Fit")).await?;

    store
        .move_stage(user, lead.id, "mensaje_enviado", None, None)
        .await?;
    let moved = store
        .move_stage(
            user,
            lead.id,
            WON,
            Some("mensaje_enviado"),
            Some("Cerró por WhatsApp".to_string()),
        )
        .await?;
    assert_eq!(moved.estado_actual, WON);

    let history = store.history(user, lead.id).await?;
    assert_eq!(history.len(), 2);
    let won = history
        .iter()
        .find(|entry| entry.new_stage == WON)
        .expect("won transition recorded");
    assert_eq!(won.previous_stage.as_deref(), Some("mensaje_enviado"));
    assert_eq!(won.notes.as_deref(), Some("Cerró por WhatsApp"));
    let first = history
        .iter()
        .find(|entry| entry.new_stage == "mensaje_enviado")
        .expect("first transition recorded");
    assert_eq!(first.previous_stage.as_deref(), Some("nuevo_lead"));

    let interactions = store.interactions(user, lead.id).await?;
    assert_eq!(interactions.len(), 2);
    assert!(
        interactions
            .iter()
            .all(|i| i.tipo_interaccion == lead_interaction::KIND_STAGE_CHANGE)
    );
    Ok(())
}

#[tokio::test]
async fn move_to_unknown_stage_changes_nothing() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let lead = store.create(user, new_lead("Ferretería")).await?;

    let err = store
        .move_stage(user, lead.id, "cerrado", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CrmError::Validation { .. }));
    assert_eq!(store.get(user, lead.id).await?.estado_actual, "nuevo_lead");
    assert!(store.history(user, lead.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn update_cannot_change_stage() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let lead = store.create(user, new_lead("Óptica")).await?;

    let patch = LeadPatch {
        estado_actual: Some(WON.to_string()),
        ..LeadPatch::default()
    };
    assert!(store.update(user, lead.id, patch).await.is_err());

    let patch = LeadPatch {
        ciudad: Some(Some("Rosario".to_string())),
        follow_up_interval_days: Some(7),
        ..LeadPatch::default()
    };
    let updated = store.update(user, lead.id, patch).await?;
    assert_eq!(updated.ciudad.as_deref(), Some("Rosario"));
    assert_eq!(updated.follow_up_interval_days, 7);
    assert_eq!(updated.estado_actual, "nuevo_lead");
    Ok(())
}

#[tokio::test]
async fn explicit_null_clears_a_field_and_absent_keeps_it() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let mut new = new_lead_with_phone("Librería Norte", "+54 11 4444-0000");
    new.owner_phone = Some("+54 11 3333-0000".to_string());
    new.ciudad = Some("Córdoba".to_string());
    let lead = store.create(user, new).await?;

    let patch: LeadPatch = serde_json::from_value(json!({ "owner_phone": null }))?;
    let updated = store.update(user, lead.id, patch).await?;

    assert_eq!(updated.owner_phone, None);
    assert_eq!(updated.business_phone.as_deref(), Some("+54 11 4444-0000"));
    assert_eq!(updated.ciudad.as_deref(), Some("Córdoba"));
    Ok(())
}

#[tokio::test]
async fn follow_up_requires_a_phone() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let lead = store.create(user, new_lead("Sin Teléfono")).await?;

    let err = store.mark_follow_up(user, lead.id).await.unwrap_err();
    assert!(matches!(err, CrmError::Precondition(_)));
    assert_eq!(store.get(user, lead.id).await?.contador_seguimientos, 0);
    Ok(())
}

#[tokio::test]
async fn follow_up_counts_and_reschedules() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let mut new = new_lead_with_phone("Veterinaria", "+54 9 11 5555-0000");
    new.follow_up_interval_days = Some(5);
    let lead = store.create(user, new).await?;

    let first = store.mark_follow_up(user, lead.id).await?;
    let second = store.mark_follow_up(user, lead.id).await?;

    let today = Utc::now().date_naive();
    assert_eq!(first.follow_up_count, 1);
    assert_eq!(second.follow_up_count, 2);
    assert_eq!(second.next_followup, today + Duration::days(5));

    let stored = store.get(user, lead.id).await?;
    assert!(stored.seguido_hoy);
    assert_eq!(stored.seguido_hoy_fecha, Some(today));
    assert!(stored.fecha_ultima_interaccion.is_some());

    let interactions = store.interactions(user, lead.id).await?;
    assert_eq!(interactions.len(), 2);
    assert_eq!(interactions[0].tipo_interaccion, lead_interaction::KIND_FOLLOW_UP);
    Ok(())
}

#[tokio::test]
async fn delete_removes_history_and_is_not_repeatable() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let lead = store.create(user, new_lead("Librería")).await?;
    store
        .move_stage(user, lead.id, "mensaje_enviado", None, None)
        .await?;

    store.remove(user, lead.id).await?;

    assert!(matches!(
        store.remove(user, lead.id).await,
        Err(CrmError::NotFound { .. })
    ));
    assert!(store.history(user, lead.id).await.is_err());
    assert!(store.list(user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn change_feed_keeps_a_cache_in_sync() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let store = lead_store(&db, &test_config())?;
    let user = Uuid::new_v4();
    let mut receiver = store.feed().subscribe();
    let mut cache = LeadCache::for_user(user, []);

    let lead = store.create(user, new_lead("Heladería")).await?;
    store.move_stage(user, lead.id, WON, None, None).await?;
    store.create(Uuid::new_v4(), new_lead("Ajeno")).await?;

    for _ in 0..3 {
        let event = receiver.recv().await?;
        cache.apply(event);
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(lead.id).map(|l| l.estado_actual.as_str()), Some(WON));

    store.remove(user, lead.id).await?;
    let event = receiver.recv().await?;
    assert!(matches!(event, ChangeEvent::Delete { .. }));
    cache.apply(event);
    assert!(cache.is_empty());
    Ok(())
}
