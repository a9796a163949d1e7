//! Events table read by [`SqlDirectory`](crate::SqlDirectory).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub capacity: i64,
    pub price_minor: i64,
    pub currency: String,
    pub start_date: DateTimeUtc,
    pub registration_deadline: Option<DateTimeUtc>,
    pub is_active: bool,
    pub is_archived: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
