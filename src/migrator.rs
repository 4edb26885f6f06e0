use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_products_table::Migration),
            Box::new(m20240301_000002_create_orders_table::Migration),
            Box::new(m20240301_000003_create_order_items_table::Migration),
            Box::new(m20240301_000004_create_delivery_tasks_table::Migration),
            Box::new(m20240301_000005_create_notifications_table::Migration),
        ]
    }
}

mod m20240301_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::VendorId).uuid().null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal().not_null())
                        .col(ColumnDef::new(Products::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        VendorId,
        Name,
        Price,
        ImageUrl,
        Active,
    }
}

mod m20240301_000002_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::BuyerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::ShippingStreet).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCity).string().not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingPostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::ShippingCountry).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentPhone).string().not_null())
                        .col(ColumnDef::new(Orders::TotalAmount).decimal().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(
                            ColumnDef::new(Orders::FulfillmentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CheckoutRequestId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Orders::MerchantRequestId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::MpesaReceipt).string().null())
                        .col(
                            ColumnDef::new(Orders::TransactionDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::PayerPhone).string().null())
                        .col(ColumnDef::new(Orders::FailureReason).string().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        BuyerId,
        ShippingStreet,
        ShippingCity,
        ShippingPostalCode,
        ShippingCountry,
        PaymentPhone,
        TotalAmount,
        PaymentStatus,
        FulfillmentStatus,
        CheckoutRequestId,
        MerchantRequestId,
        MpesaReceipt,
        TransactionDate,
        PayerPhone,
        FailureReason,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VendorId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Price).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ImageUrl).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VendorId,
        Name,
        Price,
        Quantity,
        ImageUrl,
    }
}

mod m20240301_000004_create_delivery_tasks_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_delivery_tasks_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DeliveryTasks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryTasks::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        // One task per order; duplicate acceptance must
                        // surface as a conflict, not a second task.
                        .col(
                            ColumnDef::new(DeliveryTasks::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(DeliveryTasks::VendorId).uuid().not_null())
                        .col(ColumnDef::new(DeliveryTasks::RiderId).uuid().null())
                        .col(ColumnDef::new(DeliveryTasks::Status).string().not_null())
                        .col(
                            ColumnDef::new(DeliveryTasks::PickupCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::BuyerConfirmationCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::DeliveryStreet)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::DeliveryCity)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::DeliveryPostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::DeliveryCountry)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::DeliveryFee)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryTasks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_delivery_tasks_status")
                        .table(DeliveryTasks::Table)
                        .col(DeliveryTasks::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryTasks::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum DeliveryTasks {
        Table,
        Id,
        OrderId,
        VendorId,
        RiderId,
        Status,
        PickupCode,
        BuyerConfirmationCode,
        DeliveryStreet,
        DeliveryCity,
        DeliveryPostalCode,
        DeliveryCountry,
        DeliveryFee,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_notifications_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::RecipientId).uuid().not_null())
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).string().not_null())
                        .col(
                            ColumnDef::new(Notifications::RelatedEntityId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::Read)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Notifications {
        Table,
        Id,
        RecipientId,
        Title,
        Message,
        RelatedEntityId,
        Read,
        CreatedAt,
    }
}
