// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 初始建表时的年度列范围，其他年份由应用在启动时补齐
const FIRST_YEAR: i32 = 2020;
const LAST_YEAR: i32 = 2024;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut table = Table::create();
        table
            .table(Companies::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(Companies::Bin)
                    .string()
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new(Companies::Name).text().not_null())
            .col(ColumnDef::new(Companies::CompanyType).text().not_null())
            .col(ColumnDef::new(Companies::Rnn).text().not_null())
            .col(ColumnDef::new(Companies::RegisteredAt).date().null())
            .col(
                ColumnDef::new(Companies::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            );

        for metric in ["tax_payment", "vat_refund"] {
            for year in FIRST_YEAR..=LAST_YEAR {
                table.col(
                    ColumnDef::new(Alias::new(format!("{}_{}", metric, year)))
                        .double()
                        .not_null()
                        .default(0.0),
                );
            }
        }

        manager.create_table(table.to_owned()).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Companies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Companies {
    Table,
    Bin,
    Name,
    CompanyType,
    Rnn,
    RegisteredAt,
    UpdatedAt,
}
