//! SQLite database holding keywarden users.

keywarden_core::define_database!(UserDatabase, "User database migrations complete");
