use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "investment_plans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    #[serde(with = "rust_decimal::serde::float")]
    pub initial_amount: Decimal,
    pub frequency: String, // "minute", "hour", "day"
    pub to_address: String,
    pub is_active: bool,
    pub last_execution_time: Option<DateTimeUtc>,
    pub last_tx_hash: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((38, 18)))")]
    #[serde(with = "rust_decimal::serde::float")]
    pub total_invested: Decimal,
    pub execution_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
