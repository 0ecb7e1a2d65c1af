use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    media_type TEXT,
    checksum TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'completed',
    record_count INTEGER,
    date_range_start TEXT,
    date_range_end TEXT,
    pipeline_confidence INTEGER,
    method TEXT,
    error TEXT,
    processed_at TEXT DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_owner_checksum
    ON documents(owner_id, checksum);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS category_rules (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL DEFAULT 0,
    keyword TEXT NOT NULL,
    match_field TEXT NOT NULL DEFAULT 'description',
    priority INTEGER NOT NULL DEFAULT 0,
    case_sensitive INTEGER NOT NULL DEFAULT 0,
    is_pattern INTEGER NOT NULL DEFAULT 0,
    category_id INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    document_id INTEGER,
    date TEXT,
    description TEXT NOT NULL,
    merchant TEXT,
    amount REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'ARS',
    amount_reference REAL,
    reference_number TEXT,
    category_id INTEGER,
    needs_review INTEGER NOT NULL DEFAULT 0,
    extraction_confidence INTEGER,
    raw_source TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (document_id) REFERENCES documents(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_owner_reference
    ON transactions(owner_id, reference_number)
    WHERE reference_number IS NOT NULL;

CREATE TABLE IF NOT EXISTS exchange_rates (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    from_currency TEXT NOT NULL,
    to_currency TEXT NOT NULL,
    rate REAL NOT NULL,
    source TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (date, from_currency, to_currency)
);

CREATE TABLE IF NOT EXISTS ai_quota (
    owner_id INTEGER NOT NULL,
    period_key TEXT NOT NULL,
    used INTEGER NOT NULL DEFAULT 0,
    max_uses INTEGER NOT NULL,
    PRIMARY KEY (owner_id, period_key)
);
";

// (name, description)
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Supermercado", "Compras de almacén y supermercado"),
    ("Gastronomia", "Restaurantes, cafés, delivery"),
    ("Transporte", "Viajes, combustible, transporte público"),
    ("Servicios", "Luz, gas, agua, internet, telefonía"),
    ("Suscripciones", "Streaming y servicios recurrentes"),
    ("Salud", "Farmacia, prepaga, consultas"),
    ("Hogar", "Mantenimiento y equipamiento del hogar"),
    ("Educacion", "Cursos, libros, matrículas"),
    ("Entretenimiento", "Salidas, espectáculos, juegos"),
    ("Impuestos", "Impuestos y tasas"),
    ("Transferencias", "Transferencias entre cuentas propias y a terceros"),
    ("Sueldo", "Acreditación de haberes"),
    ("Otros", "Sin clasificar"),
];

// Shared default rules (owner 0): (keyword, match_field, priority, category)
const DEFAULT_RULES: &[(&str, &str, i64, &str)] = &[
    ("SUELDO", "description", 60, "Sueldo"),
    ("HABERES", "description", 60, "Sueldo"),
    ("AFIP", "both", 60, "Impuestos"),
    ("ARCA", "both", 60, "Impuestos"),
    ("NETFLIX", "both", 50, "Suscripciones"),
    ("SPOTIFY", "both", 50, "Suscripciones"),
    ("DISNEY", "both", 50, "Suscripciones"),
    ("YOUTUBE PREMIUM", "both", 50, "Suscripciones"),
    ("COTO", "both", 40, "Supermercado"),
    ("CARREFOUR", "both", 40, "Supermercado"),
    ("JUMBO", "both", 40, "Supermercado"),
    ("DISCO", "both", 40, "Supermercado"),
    ("SUPERMERCADO", "both", 35, "Supermercado"),
    ("UBER", "both", 40, "Transporte"),
    ("CABIFY", "both", 40, "Transporte"),
    ("SUBE", "both", 40, "Transporte"),
    ("YPF", "both", 40, "Transporte"),
    ("SHELL", "both", 40, "Transporte"),
    ("EDESUR", "both", 40, "Servicios"),
    ("EDENOR", "both", 40, "Servicios"),
    ("METROGAS", "both", 40, "Servicios"),
    ("AYSA", "both", 40, "Servicios"),
    ("MOVISTAR", "both", 40, "Servicios"),
    ("CLARO", "both", 40, "Servicios"),
    ("PERSONAL FLOW", "both", 40, "Servicios"),
    ("FARMACITY", "both", 40, "Salud"),
    ("OSDE", "both", 40, "Salud"),
    ("SWISS MEDICAL", "both", 40, "Salud"),
    ("RAPPI", "both", 30, "Gastronomia"),
    ("PEDIDOSYA", "both", 30, "Gastronomia"),
    ("MCDONALDS", "both", 30, "Gastronomia"),
    ("BURGER KING", "both", 30, "Gastronomia"),
    ("STARBUCKS", "both", 30, "Gastronomia"),
    ("CAFE", "both", 20, "Gastronomia"),
    ("RESTAURANT", "both", 20, "Gastronomia"),
    ("TRANSFERENCIA", "description", 10, "Transferencias"),
    ("DEBIN", "description", 10, "Transferencias"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    let count: i64 = conn.query_row("SELECT count(*) FROM categories", [], |row| row.get(0))?;
    if count == 0 {
        for (name, description) in DEFAULT_CATEGORIES {
            conn.execute(
                "INSERT INTO categories (name, description) VALUES (?1, ?2)",
                rusqlite::params![name, description],
            )?;
        }
    }

    let rule_count: i64 =
        conn.query_row("SELECT count(*) FROM category_rules", [], |row| row.get(0))?;
    if rule_count == 0 {
        for (keyword, match_field, priority, category) in DEFAULT_RULES {
            conn.execute(
                "INSERT INTO category_rules (owner_id, keyword, match_field, priority, category_id) \
                 VALUES (0, ?1, ?2, ?3, (SELECT id FROM categories WHERE name = ?4))",
                rusqlite::params![keyword, match_field, priority, category],
            )?;
        }
    }
    Ok(())
}
