use rusqlite::Connection;

// One QA review per drop number per calendar day.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS reviews (
    id                             INTEGER PRIMARY KEY AUTOINCREMENT,
    drop_number                    TEXT NOT NULL,
    review_date                    TEXT NOT NULL,   -- YYYY-MM-DD
    project                        TEXT NOT NULL,
    submitter                      TEXT NOT NULL,
    step_01_property_frontage      INTEGER NOT NULL DEFAULT 0,
    step_02_location_before_install INTEGER NOT NULL DEFAULT 0,
    step_03_outside_cable_span     INTEGER NOT NULL DEFAULT 0,
    step_04_home_entry_outside     INTEGER NOT NULL DEFAULT 0,
    step_05_home_entry_inside      INTEGER NOT NULL DEFAULT 0,
    step_06_fibre_entry_to_ont     INTEGER NOT NULL DEFAULT 0,
    step_07_patched_labelled_drop  INTEGER NOT NULL DEFAULT 0,
    step_08_work_area_completion   INTEGER NOT NULL DEFAULT 0,
    step_09_ont_barcode_scan       INTEGER NOT NULL DEFAULT 0,
    step_10_ups_serial_number      INTEGER NOT NULL DEFAULT 0,
    step_11_powermeter_reading     INTEGER NOT NULL DEFAULT 0,
    step_12_powermeter_at_ont      INTEGER NOT NULL DEFAULT 0,
    step_13_active_broadband_light INTEGER NOT NULL DEFAULT 0,
    step_14_customer_signature     INTEGER NOT NULL DEFAULT 0,
    incomplete                     INTEGER NOT NULL DEFAULT 0,
    feedback_sent                  TEXT,            -- NULL until QA feedback goes out
    comment                        TEXT NOT NULL DEFAULT '',
    created_at                     TEXT NOT NULL,
    updated_at                     TEXT NOT NULL,

    UNIQUE (drop_number, review_date)
);

CREATE INDEX IF NOT EXISTS idx_reviews_pending
    ON reviews(incomplete, feedback_sent);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
