use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[sea_orm(unique)]
    pub stored_filename: String,
    pub size_bytes: i64,
    pub page_count: i32,
    pub is_processing: bool, // set when a conversion job is enqueued, cleared on terminal state
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(has_many = "super::audio_file::Entity")]
    AudioFile,
    #[sea_orm(has_many = "super::conversion_job::Entity")]
    ConversionJob,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::audio_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AudioFile.def()
    }
}

impl Related<super::conversion_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConversionJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
