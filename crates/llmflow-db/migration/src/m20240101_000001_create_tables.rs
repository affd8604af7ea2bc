use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Conversations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Conversations::UserId).uuid())
                    .col(ColumnDef::new(Conversations::ConversationType).text().not_null())
                    .col(ColumnDef::new(Conversations::Title).text())
                    .col(ColumnDef::new(Conversations::Status).text().not_null())
                    .col(ColumnDef::new(Conversations::Metadata).json_binary().not_null())
                    .col(ColumnDef::new(Conversations::MessageCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Conversations::LastMessageAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Conversations::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Conversations::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConversationMessages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ConversationMessages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(ConversationMessages::ConversationId).uuid().not_null())
                    .col(ColumnDef::new(ConversationMessages::Ordinal).integer().not_null())
                    .col(ColumnDef::new(ConversationMessages::Role).text().not_null())
                    .col(ColumnDef::new(ConversationMessages::Content).json_binary().not_null())
                    .col(ColumnDef::new(ConversationMessages::LlmRequestId).uuid())
                    .col(ColumnDef::new(ConversationMessages::TokensUsed).integer())
                    .col(ColumnDef::new(ConversationMessages::CostEstimate).double())
                    .col(ColumnDef::new(ConversationMessages::Metadata).json_binary().not_null())
                    .col(ColumnDef::new(ConversationMessages::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(ConversationMessages::Table, ConversationMessages::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_messages_conversation_ordinal")
                    .table(ConversationMessages::Table)
                    .col(ConversationMessages::ConversationId)
                    .col(ConversationMessages::Ordinal)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FlowRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FlowRuns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FlowRuns::FlowName).text().not_null())
                    .col(ColumnDef::new(FlowRuns::UserId).uuid())
                    .col(ColumnDef::new(FlowRuns::Status).text().not_null())
                    .col(ColumnDef::new(FlowRuns::ExecutionMode).text().not_null())
                    .col(ColumnDef::new(FlowRuns::CurrentStep).text())
                    .col(ColumnDef::new(FlowRuns::StepProgress).integer().not_null().default(0))
                    .col(ColumnDef::new(FlowRuns::TotalSteps).integer())
                    .col(ColumnDef::new(FlowRuns::Percentage).integer().not_null().default(0))
                    .col(ColumnDef::new(FlowRuns::TotalTokens).integer().not_null().default(0))
                    .col(ColumnDef::new(FlowRuns::TotalCostEstimate).double().not_null().default(0.0))
                    .col(ColumnDef::new(FlowRuns::LastHeartbeat).timestamp_with_time_zone())
                    .col(ColumnDef::new(FlowRuns::Inputs).json_binary().not_null())
                    .col(ColumnDef::new(FlowRuns::Outputs).json_binary())
                    .col(ColumnDef::new(FlowRuns::ErrorMessage).text())
                    .col(ColumnDef::new(FlowRuns::StartedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(FlowRuns::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FlowStepRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FlowStepRuns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FlowStepRuns::FlowRunId).uuid().not_null())
                    .col(ColumnDef::new(FlowStepRuns::StepName).text().not_null())
                    .col(ColumnDef::new(FlowStepRuns::StepOrder).integer().not_null())
                    .col(ColumnDef::new(FlowStepRuns::StepKind).text().not_null())
                    .col(ColumnDef::new(FlowStepRuns::Status).text().not_null())
                    .col(ColumnDef::new(FlowStepRuns::Inputs).json_binary().not_null())
                    .col(ColumnDef::new(FlowStepRuns::Outputs).json_binary())
                    .col(ColumnDef::new(FlowStepRuns::LlmRequestId).uuid())
                    .col(ColumnDef::new(FlowStepRuns::TokensUsed).integer())
                    .col(ColumnDef::new(FlowStepRuns::CostEstimate).double())
                    .col(ColumnDef::new(FlowStepRuns::ExecutionTimeMs).big_integer())
                    .col(ColumnDef::new(FlowStepRuns::ErrorMessage).text())
                    .col(ColumnDef::new(FlowStepRuns::StartedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(FlowStepRuns::CompletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(FlowStepRuns::Table, FlowStepRuns::FlowRunId)
                            .to(FlowRuns::Table, FlowRuns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_flow_step_runs_run_order")
                    .table(FlowStepRuns::Table)
                    .col(FlowStepRuns::FlowRunId)
                    .col(FlowStepRuns::StepOrder)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LlmRequests::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(LlmRequests::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(LlmRequests::UserId).uuid())
                    .col(ColumnDef::new(LlmRequests::Provider).text().not_null())
                    .col(ColumnDef::new(LlmRequests::Model).text().not_null())
                    .col(ColumnDef::new(LlmRequests::Temperature).float())
                    .col(ColumnDef::new(LlmRequests::MaxOutputTokens).integer())
                    .col(ColumnDef::new(LlmRequests::Status).text().not_null())
                    .col(ColumnDef::new(LlmRequests::Messages).json_binary().not_null())
                    .col(ColumnDef::new(LlmRequests::AdditionalParams).json_binary().not_null())
                    .col(ColumnDef::new(LlmRequests::RequestPayload).json_binary().not_null())
                    .col(ColumnDef::new(LlmRequests::ResponseContent).text())
                    .col(ColumnDef::new(LlmRequests::ResponseRaw).json_binary())
                    .col(ColumnDef::new(LlmRequests::InputTokens).integer())
                    .col(ColumnDef::new(LlmRequests::OutputTokens).integer())
                    .col(ColumnDef::new(LlmRequests::CostEstimate).double())
                    .col(ColumnDef::new(LlmRequests::FinishReason).text())
                    .col(ColumnDef::new(LlmRequests::Cached).boolean().not_null().default(false))
                    .col(ColumnDef::new(LlmRequests::RetryAttempt).integer().not_null().default(1))
                    .col(ColumnDef::new(LlmRequests::ErrorMessage).text())
                    .col(ColumnDef::new(LlmRequests::ErrorType).text())
                    .col(ColumnDef::new(LlmRequests::ProviderResponseId).text())
                    .col(ColumnDef::new(LlmRequests::SystemFingerprint).text())
                    .col(ColumnDef::new(LlmRequests::ResponseCreatedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(LlmRequests::DurationMs).big_integer())
                    .col(ColumnDef::new(LlmRequests::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(LlmRequests::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tasks::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Tasks::QueueName).text().not_null())
                    .col(ColumnDef::new(Tasks::FlowName).text().not_null())
                    .col(ColumnDef::new(Tasks::FlowRunId).uuid())
                    .col(ColumnDef::new(Tasks::UserId).uuid())
                    .col(ColumnDef::new(Tasks::Status).text().not_null())
                    .col(ColumnDef::new(Tasks::Priority).integer().not_null().default(0))
                    .col(ColumnDef::new(Tasks::RetryCount).integer().not_null().default(0))
                    .col(ColumnDef::new(Tasks::ProgressPercentage).integer().not_null().default(0))
                    .col(ColumnDef::new(Tasks::WorkerId).text())
                    .col(ColumnDef::new(Tasks::ErrorMessage).text())
                    .col(ColumnDef::new(Tasks::SubmittedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Tasks::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Tasks::FinishedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WorkerHealth::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WorkerHealth::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(WorkerHealth::Hostname).text().not_null())
                    .col(ColumnDef::new(WorkerHealth::Status).text().not_null())
                    .col(ColumnDef::new(WorkerHealth::LastHeartbeatAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(WorkerHealth::RegisteredAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(WorkerHealth::Table).if_exists().to_owned()).await?;
        manager.drop_table(Table::drop().table(Tasks::Table).if_exists().to_owned()).await?;
        manager.drop_table(Table::drop().table(LlmRequests::Table).if_exists().to_owned()).await?;
        manager.drop_table(Table::drop().table(FlowStepRuns::Table).if_exists().to_owned()).await?;
        manager.drop_table(Table::drop().table(FlowRuns::Table).if_exists().to_owned()).await?;
        manager.drop_table(Table::drop().table(ConversationMessages::Table).if_exists().to_owned()).await?;
        manager.drop_table(Table::drop().table(Conversations::Table).if_exists().to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    UserId,
    ConversationType,
    Title,
    Status,
    Metadata,
    MessageCount,
    LastMessageAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ConversationMessages {
    Table,
    Id,
    ConversationId,
    Ordinal,
    Role,
    Content,
    LlmRequestId,
    TokensUsed,
    CostEstimate,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FlowRuns {
    Table,
    Id,
    FlowName,
    UserId,
    Status,
    ExecutionMode,
    CurrentStep,
    StepProgress,
    TotalSteps,
    Percentage,
    TotalTokens,
    TotalCostEstimate,
    LastHeartbeat,
    Inputs,
    Outputs,
    ErrorMessage,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum FlowStepRuns {
    Table,
    Id,
    FlowRunId,
    StepName,
    StepOrder,
    StepKind,
    Status,
    Inputs,
    Outputs,
    LlmRequestId,
    TokensUsed,
    CostEstimate,
    ExecutionTimeMs,
    ErrorMessage,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum LlmRequests {
    Table,
    Id,
    UserId,
    Provider,
    Model,
    Temperature,
    MaxOutputTokens,
    Status,
    Messages,
    AdditionalParams,
    RequestPayload,
    ResponseContent,
    ResponseRaw,
    InputTokens,
    OutputTokens,
    CostEstimate,
    FinishReason,
    Cached,
    RetryAttempt,
    ErrorMessage,
    ErrorType,
    ProviderResponseId,
    SystemFingerprint,
    ResponseCreatedAt,
    DurationMs,
    CreatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    QueueName,
    FlowName,
    FlowRunId,
    UserId,
    Status,
    Priority,
    RetryCount,
    ProgressPercentage,
    WorkerId,
    ErrorMessage,
    SubmittedAt,
    StartedAt,
    FinishedAt,
}

#[derive(DeriveIden)]
enum WorkerHealth {
    Table,
    Id,
    Hostname,
    Status,
    LastHeartbeatAt,
    RegisteredAt,
}
