//! Schema migrations for the engine database
//!
//! SQL files live next to this module and are embedded with `include_str!`.
//! `MigrationService` applies them by name order and records each one in
//! `sys_migrations`.

/// `(file name, sql)` pairs. New files get the next `NNN_` prefix and an entry here.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
