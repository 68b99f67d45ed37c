use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_CANCELED: &str = "canceled";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub name: String,
    pub created_at: DateTime,
    #[sea_orm(unique)]
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: String, // inactive, active, canceled, or whatever Stripe reports
    pub subscription_end_date: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::document::Entity")]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Entitled iff the subscription is active and the end date, when set,
    /// is still in the future.
    pub fn is_subscribed_at(&self, now: DateTime) -> bool {
        if self.subscription_status != STATUS_ACTIVE {
            return false;
        }
        match self.subscription_end_date {
            Some(end) => end > now,
            None => true,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.is_subscribed_at(chrono::Utc::now().naive_utc())
    }
}
