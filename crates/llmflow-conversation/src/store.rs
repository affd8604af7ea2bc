//! Transcript persistence (`spec.md` §4.F): append-only
//! `conversation_messages` rows bound to a `conversations` row, with the
//! dense `ordinal` invariant enforced at the application layer (the entity
//! carries no DB uniqueness constraint on it -- see
//! `llmflow_db::entity::conversation_messages::Model`'s doc comment).

use llmflow_db::entity::conversation_messages::{
    ActiveModel as MessageActiveModel, Column as MessageColumn, Entity as MessageEntity, Model as MessageModel,
};
use llmflow_db::entity::conversations::{ActiveModel as ConversationActiveModel, Column as ConversationColumn, Entity as ConversationEntity, Model as ConversationModel};
use llmflow_db::DbHandle;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConversationStoreError {
    #[error(transparent)]
    Db(#[from] DbErr),
    #[error(transparent)]
    DbHandle(#[from] llmflow_db::DbError),
    #[error("conversation {0} not found")]
    NotFound(Uuid),
}

/// A conversation together with its full transcript, in `ordinal` order.
#[derive(Debug, Clone)]
pub struct ConversationWithMessages {
    pub summary: ConversationModel,
    pub messages: Vec<MessageModel>,
}

pub struct ConversationStore;

impl ConversationStore {
    pub async fn create_conversation<C: ConnectionTrait>(
        db: &C,
        conversation_type: &str,
        user_id: Option<Uuid>,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<ConversationModel, ConversationStoreError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let model = ConversationActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            conversation_type: Set(conversation_type.to_owned()),
            title: Set(title),
            status: Set("active".to_owned()),
            metadata: Set(metadata.unwrap_or(Value::Object(Default::default()))),
            message_count: Set(0),
            last_message_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(db).await?)
    }

    pub async fn get_conversation_summary<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<ConversationModel>, ConversationStoreError> {
        Ok(ConversationEntity::find_by_id(id).one(db).await?)
    }

    pub async fn get_conversation<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<ConversationWithMessages>, ConversationStoreError> {
        let Some(summary) = ConversationEntity::find_by_id(id).one(db).await? else {
            return Ok(None);
        };
        let messages = MessageEntity::find()
            .filter(MessageColumn::ConversationId.eq(id))
            .order_by_asc(MessageColumn::Ordinal)
            .all(db)
            .await?;
        Ok(Some(ConversationWithMessages { summary, messages }))
    }

    /// `include_system=true` returns the full transcript; `false` filters
    /// out `system`-role rows, which the caller typically folds into a
    /// fresh `system_prompt` instead of replaying from history.
    pub async fn get_message_history<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        limit: Option<u64>,
        include_system: bool,
    ) -> Result<Vec<MessageModel>, ConversationStoreError> {
        let mut query = MessageEntity::find().filter(MessageColumn::ConversationId.eq(id)).order_by_asc(MessageColumn::Ordinal);
        if !include_system {
            query = query.filter(MessageColumn::Role.ne("system"));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.all(db).await?)
    }

    /// `spec.md` §4.F: re-reads the parent conversation, assigns
    /// `ordinal = message_count + 1`, inserts the message, increments
    /// `message_count`, and bumps `last_message_at`/`updated_at` -- all
    /// inside one transaction, so a concurrent append can never observe or
    /// produce a duplicate ordinal.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_message(
        db: &DbHandle,
        conversation_id: Uuid,
        role: &str,
        content: Value,
        llm_request_id: Option<Uuid>,
        tokens_used: Option<i32>,
        cost_estimate: Option<f64>,
        metadata: Value,
    ) -> Result<MessageModel, ConversationStoreError> {
        let role = role.to_owned();
        db.with_transaction(move |txn| {
            Box::pin(async move {
                let conversation = ConversationEntity::find_by_id(conversation_id)
                    .one(txn)
                    .await
                    .map_err(ConversationStoreError::from)?
                    .ok_or(ConversationStoreError::NotFound(conversation_id))?;

                let ordinal = conversation.message_count + 1;
                let now = OffsetDateTime::now_utc();

                let message = MessageActiveModel {
                    id: Set(Uuid::new_v4()),
                    conversation_id: Set(conversation_id),
                    ordinal: Set(ordinal),
                    role: Set(role),
                    content: Set(content),
                    llm_request_id: Set(llm_request_id),
                    tokens_used: Set(tokens_used),
                    cost_estimate: Set(cost_estimate),
                    metadata: Set(metadata),
                    created_at: Set(now.into()),
                };
                let inserted = message.insert(txn).await?;

                let mut conversation: ConversationActiveModel = conversation.into();
                conversation.message_count = Set(ordinal);
                conversation.last_message_at = Set(Some(now.into()));
                conversation.updated_at = Set(now.into());
                conversation.update(txn).await?;

                Ok(inserted)
            })
        })
        .await
    }

    pub async fn update_metadata<C: ConnectionTrait>(db: &C, id: Uuid, patch: Value, merge: bool) -> Result<ConversationModel, ConversationStoreError> {
        let conversation = ConversationEntity::find_by_id(id).one(db).await?.ok_or(ConversationStoreError::NotFound(id))?;

        let new_metadata = if merge {
            merge_json(conversation.metadata.clone(), patch)
        } else {
            patch
        };

        let mut model: ConversationActiveModel = conversation.into();
        model.metadata = Set(new_metadata);
        model.updated_at = Set(OffsetDateTime::now_utc().into());
        Ok(model.update(db).await?)
    }

    pub async fn update_title<C: ConnectionTrait>(db: &C, id: Uuid, title: Option<String>) -> Result<ConversationModel, ConversationStoreError> {
        let mut model: ConversationActiveModel = ConversationEntity::find_by_id(id).one(db).await?.ok_or(ConversationStoreError::NotFound(id))?.into();
        model.title = Set(title);
        model.updated_at = Set(OffsetDateTime::now_utc().into());
        Ok(model.update(db).await?)
    }

    pub async fn update_status<C: ConnectionTrait>(db: &C, id: Uuid, status: &str) -> Result<ConversationModel, ConversationStoreError> {
        let mut model: ConversationActiveModel = ConversationEntity::find_by_id(id).one(db).await?.ok_or(ConversationStoreError::NotFound(id))?.into();
        model.status = Set(status.to_owned());
        model.updated_at = Set(OffsetDateTime::now_utc().into());
        Ok(model.update(db).await?)
    }

    pub async fn by_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<Vec<ConversationModel>, ConversationStoreError> {
        Ok(ConversationEntity::find()
            .filter(ConversationColumn::UserId.eq(user_id))
            .order_by_desc(ConversationColumn::UpdatedAt)
            .all(db)
            .await?)
    }
}

fn merge_json(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                base_map.insert(key, value);
            }
            Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_migration::{Migrator, MigratorTrait};

    async fn db() -> DbHandle {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn appending_messages_assigns_dense_ordinals_and_bumps_message_count() {
        let db = db().await;
        let conversation = ConversationStore::create_conversation(db.connection(), "learning_coach", None, None, None).await.unwrap();

        let m1 = ConversationStore::append_message(&db, conversation.id, "user", Value::String("hi".into()), None, None, None, Value::Null).await.unwrap();
        let m2 = ConversationStore::append_message(&db, conversation.id, "assistant", Value::String("hello".into()), None, None, None, Value::Null).await.unwrap();

        assert_eq!(m1.ordinal, 1);
        assert_eq!(m2.ordinal, 2);

        let summary = ConversationStore::get_conversation_summary(db.connection(), conversation.id).await.unwrap().unwrap();
        assert_eq!(summary.message_count, 2);
        assert!(summary.last_message_at.is_some());
    }

    #[tokio::test]
    async fn get_message_history_can_exclude_system_messages() {
        let db = db().await;
        let conversation = ConversationStore::create_conversation(db.connection(), "learning_coach", None, None, None).await.unwrap();
        ConversationStore::append_message(&db, conversation.id, "system", Value::String("be nice".into()), None, None, None, Value::Null).await.unwrap();
        ConversationStore::append_message(&db, conversation.id, "user", Value::String("hi".into()), None, None, None, Value::Null).await.unwrap();

        let full = ConversationStore::get_message_history(db.connection(), conversation.id, None, true).await.unwrap();
        assert_eq!(full.len(), 2);

        let without_system = ConversationStore::get_message_history(db.connection(), conversation.id, None, false).await.unwrap();
        assert_eq!(without_system.len(), 1);
        assert_eq!(without_system[0].role, "user");
    }

    #[tokio::test]
    async fn update_metadata_merges_by_default() {
        let db = db().await;
        let conversation = ConversationStore::create_conversation(
            db.connection(),
            "learning_coach",
            None,
            None,
            Some(serde_json::json!({ "topic": "rust" })),
        )
        .await
        .unwrap();

        let updated = ConversationStore::update_metadata(db.connection(), conversation.id, serde_json::json!({ "level": "intro" }), true).await.unwrap();
        assert_eq!(updated.metadata["topic"], Value::String("rust".into()));
        assert_eq!(updated.metadata["level"], Value::String("intro".into()));
    }
}
