use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            tier        TEXT NOT NULL DEFAULT 'free',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS interactions (
            actor_id    TEXT NOT NULL REFERENCES users(id),
            target_id   TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (actor_id, target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_interactions_target
            ON interactions(target_id, actor_id);

        CREATE TABLE IF NOT EXISTS rooms (
            id              TEXT PRIMARY KEY,
            display_name    TEXT,
            created_at      TEXT NOT NULL
        );

        -- user_a <= user_b; the unordered pair is the dedup key
        CREATE TABLE IF NOT EXISTS matches (
            id          TEXT PRIMARY KEY,
            user_a      TEXT NOT NULL REFERENCES users(id),
            user_b      TEXT NOT NULL REFERENCES users(id),
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(user_a, user_b)
        );

        CREATE TABLE IF NOT EXISTS room_participants (
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON room_participants(user_id);

        -- presence in this table is membership in the room's hidden_for set
        CREATE TABLE IF NOT EXISTS room_hidden (
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            hidden_at   TEXT NOT NULL,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            content     TEXT NOT NULL,
            metadata    TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS credit_balances (
            user_id     TEXT PRIMARY KEY REFERENCES users(id),
            amount      INTEGER NOT NULL CHECK (amount >= 0)
        );

        CREATE TABLE IF NOT EXISTS credit_transactions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            delta       INTEGER NOT NULL,
            reason      TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_credit_transactions_user
            ON credit_transactions(user_id, created_at);

        -- per-(viewer, room) personal deletion boundary; never touches messages
        CREATE TABLE IF NOT EXISTS deletion_boundaries (
            room_id     TEXT NOT NULL REFERENCES rooms(id),
            viewer_id   TEXT NOT NULL REFERENCES users(id),
            deleted_at  TEXT NOT NULL,
            PRIMARY KEY (room_id, viewer_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
