use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(InvestmentPlan::Table)
                .if_not_exists()
                .col(ColumnDef::new(InvestmentPlan::Id).uuid().not_null().primary_key())
                .col(ColumnDef::new(InvestmentPlan::UserId).uuid().not_null())
                .col(ColumnDef::new(InvestmentPlan::Amount).decimal_len(38, 18).not_null())
                .col(ColumnDef::new(InvestmentPlan::InitialAmount).decimal_len(38, 18).not_null())
                .col(ColumnDef::new(InvestmentPlan::Frequency).string_len(16).not_null())
                .col(ColumnDef::new(InvestmentPlan::ToAddress).string().not_null())
                .col(ColumnDef::new(InvestmentPlan::IsActive).boolean().not_null().default(true))
                .col(ColumnDef::new(InvestmentPlan::LastExecutionTime).timestamp_with_time_zone())
                .col(ColumnDef::new(InvestmentPlan::LastTxHash).string())
                .col(
                    ColumnDef::new(InvestmentPlan::TotalInvested)
                        .decimal_len(38, 18)
                        .not_null()
                        .default(0)
                )
                .col(ColumnDef::new(InvestmentPlan::ExecutionCount).integer().not_null().default(0))
                .col(
                    ColumnDef::new(InvestmentPlan::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(InvestmentPlan::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_investment_plans_user")
                        .from(InvestmentPlan::Table, InvestmentPlan::UserId)
                        .to(User::Table, User::Id)
                        .on_delete(ForeignKeyAction::Restrict)
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_investment_plans_user_id")
                .table(InvestmentPlan::Table)
                .col(InvestmentPlan::UserId)
                .to_owned()
        ).await?;

        // Startup scans active plans
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_investment_plans_is_active")
                .table(InvestmentPlan::Table)
                .col(InvestmentPlan::IsActive)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(InvestmentPlan::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum InvestmentPlan {
    #[sea_orm(iden = "investment_plans")]
    Table,
    Id,
    UserId,
    Amount,
    InitialAmount,
    Frequency,
    ToAddress,
    IsActive,
    LastExecutionTime,
    LastTxHash,
    TotalInvested,
    ExecutionCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
}
