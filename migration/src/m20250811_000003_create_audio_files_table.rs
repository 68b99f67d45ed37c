use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AudioFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AudioFiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AudioFiles::DocumentId).uuid().not_null())
                    .col(
                        ColumnDef::new(AudioFiles::StoredFilename)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AudioFiles::DurationSeconds).double().not_null())
                    .col(ColumnDef::new(AudioFiles::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_audio_files_document_id")
                            .from(AudioFiles::Table, AudioFiles::DocumentId)
                            .to(Documents::Table, Documents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AudioFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AudioFiles {
    Table,
    Id,
    DocumentId,
    StoredFilename,
    DurationSeconds,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
}
