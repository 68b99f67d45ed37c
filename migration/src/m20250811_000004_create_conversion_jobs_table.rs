use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConversionJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConversionJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConversionJobs::DocumentId).uuid().not_null())
                    .col(ColumnDef::new(ConversionJobs::Status).string().not_null())
                    .col(ColumnDef::new(ConversionJobs::Error).text().null())
                    .col(ColumnDef::new(ConversionJobs::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ConversionJobs::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversion_jobs_document_id")
                            .from(ConversionJobs::Table, ConversionJobs::DocumentId)
                            .to(Documents::Table, Documents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConversionJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConversionJobs {
    Table,
    Id,
    DocumentId,
    Status,
    Error,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
}
