//! Migration to add single-use purpose tokens.
//!
//! Purpose tokens back the account recovery flows (reset password, confirm and
//! change email or phone, custom purposes). Only a digest of the token is stored.

use sea_orm_migration::prelude::*;

use crate::m20260301_000000_create_identity_tables::IdentityUser;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IdentityPurposeToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityPurposeToken::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdentityPurposeToken::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityPurposeToken::Purpose)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityPurposeToken::TokenHash)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdentityPurposeToken::Payload).text().null())
                    .col(
                        ColumnDef::new(IdentityPurposeToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityPurposeToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_purpose_token_user")
                            .from(IdentityPurposeToken::Table, IdentityPurposeToken::UserId)
                            .to(IdentityUser::Table, IdentityUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_purpose_token_user_purpose")
                    .table(IdentityPurposeToken::Table)
                    .col(IdentityPurposeToken::UserId)
                    .col(IdentityPurposeToken::Purpose)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_purpose_token_user_purpose")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityPurposeToken::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum IdentityPurposeToken {
    Table,
    Id,
    UserId,
    Purpose,
    TokenHash,
    Payload,
    ExpiresAt,
    CreatedAt,
}
