/// Vocabulary, the three typed field tables, their link tables and the
/// primary log table. Uniqueness constraints are what make get-or-create safe
/// under concurrent writers.
pub const SCHEMA_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS vocab_id_seq;
CREATE SEQUENCE IF NOT EXISTS field_int_id_seq;
CREATE SEQUENCE IF NOT EXISTS field_float_id_seq;
CREATE SEQUENCE IF NOT EXISTS field_text_id_seq;
CREATE SEQUENCE IF NOT EXISTS logs_id_seq;

CREATE TABLE IF NOT EXISTS vocab (
  id BIGINT PRIMARY KEY DEFAULT nextval('vocab_id_seq'),
  value TEXT NOT NULL UNIQUE,
  "type" TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS field_int (
  id BIGINT PRIMARY KEY DEFAULT nextval('field_int_id_seq'),
  name BIGINT NOT NULL,
  value BIGINT NOT NULL,
  UNIQUE (name, value)
);

CREATE TABLE IF NOT EXISTS field_float (
  id BIGINT PRIMARY KEY DEFAULT nextval('field_float_id_seq'),
  name BIGINT NOT NULL,
  value DOUBLE NOT NULL,
  UNIQUE (name, value)
);

CREATE TABLE IF NOT EXISTS field_text (
  id BIGINT PRIMARY KEY DEFAULT nextval('field_text_id_seq'),
  name BIGINT NOT NULL,
  value BIGINT NOT NULL,
  UNIQUE (name, value)
);

CREATE TABLE IF NOT EXISTS logs (
  "time" TIMESTAMP NOT NULL,
  id BIGINT PRIMARY KEY DEFAULT nextval('logs_id_seq'),
  message TEXT,
  correlation_id UUID
);

CREATE TABLE IF NOT EXISTS log_field_int (
  log_id BIGINT NOT NULL,
  field_id BIGINT NOT NULL,
  UNIQUE (log_id, field_id)
);

CREATE TABLE IF NOT EXISTS log_field_float (
  log_id BIGINT NOT NULL,
  field_id BIGINT NOT NULL,
  UNIQUE (log_id, field_id)
);

CREATE TABLE IF NOT EXISTS log_field_text (
  log_id BIGINT NOT NULL,
  field_id BIGINT NOT NULL,
  UNIQUE (log_id, field_id)
);

CREATE INDEX IF NOT EXISTS idx_logs_time ON logs("time");
CREATE INDEX IF NOT EXISTS idx_logs_correlation ON logs(correlation_id);
CREATE INDEX IF NOT EXISTS idx_log_field_int_field ON log_field_int(field_id);
CREATE INDEX IF NOT EXISTS idx_log_field_float_field ON log_field_float(field_id);
CREATE INDEX IF NOT EXISTS idx_log_field_text_field ON log_field_text(field_id);
"#;
