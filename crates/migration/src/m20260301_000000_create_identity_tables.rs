//! Migration creating the identity store tables.
//!
//! Creates tables for:
//! - identity_user: Local accounts (credentials, confirmation and lockout state)
//! - identity_role / identity_user_role: Roles and their assignment to users
//! - identity_user_claim / identity_role_claim: Free-form (type, value) claims
//! - identity_user_login: External provider logins linked to users
//! - identity_user_token: Refresh tokens, one row per (user, login provider, app)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Users
        manager
            .create_table(
                Table::create()
                    .table(IdentityUser::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityUser::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdentityUser::UserName).string().not_null())
                    .col(
                        ColumnDef::new(IdentityUser::NormalizedUserName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(IdentityUser::Email).string().null())
                    .col(ColumnDef::new(IdentityUser::NormalizedEmail).string().null())
                    .col(
                        ColumnDef::new(IdentityUser::EmailConfirmed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::PasswordHash)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(IdentityUser::PhoneNumber).string().null())
                    .col(
                        ColumnDef::new(IdentityUser::PhoneNumberConfirmed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::TwoFactorEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::LockoutEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::LockoutEnd)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::AccessFailedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. Roles
        manager
            .create_table(
                Table::create()
                    .table(IdentityRole::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityRole::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdentityRole::Name).string().not_null())
                    .col(
                        ColumnDef::new(IdentityRole::NormalizedName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. User <-> role assignments
        manager
            .create_table(
                Table::create()
                    .table(IdentityUserRole::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(IdentityUserRole::UserId).string().not_null())
                    .col(ColumnDef::new(IdentityUserRole::RoleId).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(IdentityUserRole::UserId)
                            .col(IdentityUserRole::RoleId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_user_role_user")
                            .from(IdentityUserRole::Table, IdentityUserRole::UserId)
                            .to(IdentityUser::Table, IdentityUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_user_role_role")
                            .from(IdentityUserRole::Table, IdentityUserRole::RoleId)
                            .to(IdentityRole::Table, IdentityRole::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. User claims
        manager
            .create_table(
                Table::create()
                    .table(IdentityUserClaim::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityUserClaim::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdentityUserClaim::UserId).string().not_null())
                    .col(
                        ColumnDef::new(IdentityUserClaim::ClaimType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUserClaim::ClaimValue)
                            .text()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_user_claim_user")
                            .from(IdentityUserClaim::Table, IdentityUserClaim::UserId)
                            .to(IdentityUser::Table, IdentityUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 5. Role claims
        manager
            .create_table(
                Table::create()
                    .table(IdentityRoleClaim::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityRoleClaim::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdentityRoleClaim::RoleId).string().not_null())
                    .col(
                        ColumnDef::new(IdentityRoleClaim::ClaimType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityRoleClaim::ClaimValue)
                            .text()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_role_claim_role")
                            .from(IdentityRoleClaim::Table, IdentityRoleClaim::RoleId)
                            .to(IdentityRole::Table, IdentityRole::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 6. External logins, keyed by (provider, provider subject)
        manager
            .create_table(
                Table::create()
                    .table(IdentityUserLogin::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityUserLogin::LoginProvider)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUserLogin::ProviderKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUserLogin::ProviderDisplayName)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(IdentityUserLogin::UserId).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(IdentityUserLogin::LoginProvider)
                            .col(IdentityUserLogin::ProviderKey),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_user_login_user")
                            .from(IdentityUserLogin::Table, IdentityUserLogin::UserId)
                            .to(IdentityUser::Table, IdentityUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 7. Refresh tokens: the primary key enforces one row per (user, provider, app)
        manager
            .create_table(
                Table::create()
                    .table(IdentityUserToken::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(IdentityUserToken::UserId).string().not_null())
                    .col(
                        ColumnDef::new(IdentityUserToken::LoginProvider)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IdentityUserToken::Name).string().not_null())
                    .col(ColumnDef::new(IdentityUserToken::Value).string().not_null())
                    .col(
                        ColumnDef::new(IdentityUserToken::ExpireAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(IdentityUserToken::UserId)
                            .col(IdentityUserToken::LoginProvider)
                            .col(IdentityUserToken::Name),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_user_token_user")
                            .from(IdentityUserToken::Table, IdentityUserToken::UserId)
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
                    .name("idx_identity_user_normalized_email")
                    .table(IdentityUser::Table)
                    .col(IdentityUser::NormalizedEmail)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_user_phone_number")
                    .table(IdentityUser::Table)
                    .col(IdentityUser::PhoneNumber)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_user_claim_user_id")
                    .table(IdentityUserClaim::Table)
                    .col(IdentityUserClaim::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_user_login_user_id")
                    .table(IdentityUserLogin::Table)
                    .col(IdentityUserLogin::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_user_login_user_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_user_claim_user_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_identity_user_phone_number").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_user_normalized_email")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(IdentityUserToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityUserLogin::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityRoleClaim::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityUserClaim::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityUserRole::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityRole::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityUser::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum IdentityUser {
    Table,
    Id,
    UserName,
    NormalizedUserName,
    Email,
    NormalizedEmail,
    EmailConfirmed,
    PasswordHash,
    PhoneNumber,
    PhoneNumberConfirmed,
    TwoFactorEnabled,
    LockoutEnabled,
    LockoutEnd,
    AccessFailedCount,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IdentityRole {
    Table,
    Id,
    Name,
    NormalizedName,
}

#[derive(DeriveIden)]
enum IdentityUserRole {
    Table,
    UserId,
    RoleId,
}

#[derive(DeriveIden)]
enum IdentityUserClaim {
    Table,
    Id,
    UserId,
    ClaimType,
    ClaimValue,
}

#[derive(DeriveIden)]
enum IdentityRoleClaim {
    Table,
    Id,
    RoleId,
    ClaimType,
    ClaimValue,
}

#[derive(DeriveIden)]
enum IdentityUserLogin {
    Table,
    LoginProvider,
    ProviderKey,
    ProviderDisplayName,
    UserId,
}

#[derive(DeriveIden)]
enum IdentityUserToken {
    Table,
    UserId,
    LoginProvider,
    Name,
    Value,
    ExpireAt,
}
