//! Statement text for the staging and star-schema tables.
//!
//! Staging tables mirror the raw JSON. `songplays` is the fact table; the
//! four dimensions are derived from staging (and `times` from `songplays`),
//! so the insert order matters.

use dwh_core::config::S3Config;

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIMES: &str = "times";

/// Every table, staging first.
pub const TABLES: [&str; 7] = [
    STAGING_EVENTS,
    STAGING_SONGS,
    SONGPLAYS,
    USERS,
    SONGS,
    ARTISTS,
    TIMES,
];

/// One SQL statement and a short label for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub label: String,
    pub sql: String,
}

impl Statement {
    fn new(label: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sql: sql.into(),
        }
    }
}

const CREATE_STAGING_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS staging_events (
    artist          VARCHAR,
    auth            VARCHAR,
    firstName       VARCHAR,
    gender          CHAR(1),
    itemInSession   INT,
    lastName        VARCHAR,
    length          FLOAT,
    level           VARCHAR,
    location        VARCHAR,
    method          VARCHAR,
    page            VARCHAR,
    registration    FLOAT,
    sessionId       INT SORTKEY,
    song            VARCHAR,
    status          INT,
    ts              BIGINT,
    userAgent       VARCHAR,
    userId          INT
)"#;

const CREATE_STAGING_SONGS: &str = r#"
CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs           INT,
    artist_id           VARCHAR(MAX),
    artist_latitude     FLOAT,
    artist_longitude    FLOAT,
    artist_location     VARCHAR(MAX),
    artist_name         VARCHAR(MAX),
    song_id             VARCHAR(MAX),
    title               VARCHAR(MAX),
    duration            REAL,
    year                INT
)"#;

const CREATE_SONGPLAYS: &str = r#"
CREATE TABLE IF NOT EXISTS songplays (
    songplay_id INT IDENTITY(0,1) PRIMARY KEY,
    start_time  TIMESTAMP,
    user_id     INT,
    level       VARCHAR,
    song_id     VARCHAR,
    artist_id   VARCHAR,
    session_id  INT,
    location    VARCHAR,
    user_agent  VARCHAR
)"#;

const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id     VARCHAR PRIMARY KEY,
    first_name  VARCHAR NOT NULL,
    last_name   VARCHAR NOT NULL,
    gender      CHAR(1),
    level       VARCHAR
)"#;

const CREATE_SONGS: &str = r#"
CREATE TABLE IF NOT EXISTS songs (
    song_id     VARCHAR PRIMARY KEY,
    title       VARCHAR NOT NULL,
    artist_id   VARCHAR NOT NULL,
    year        INT NOT NULL,
    duration    DECIMAL NOT NULL
)"#;

const CREATE_ARTISTS: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
    artist_id   VARCHAR PRIMARY KEY,
    name        VARCHAR NOT NULL,
    location    VARCHAR,
    latitude    DECIMAL,
    longitude   DECIMAL
)"#;

const CREATE_TIMES: &str = r#"
CREATE TABLE IF NOT EXISTS times (
    start_time  TIMESTAMP PRIMARY KEY,
    hour        NUMERIC NOT NULL,
    day         NUMERIC NOT NULL,
    week        NUMERIC NOT NULL,
    month       NUMERIC NOT NULL,
    year        NUMERIC NOT NULL,
    weekday     NUMERIC NOT NULL
)"#;

// Unmatched events keep NULL song/artist ids.
const INSERT_SONGPLAYS: &str = r#"
INSERT INTO songplays (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
SELECT
    TIMESTAMP 'epoch' + (e.ts / 1000 * INTERVAL '1 second'),
    e.userId,
    e.level,
    s.song_id,
    s.artist_id,
    e.sessionId,
    e.location,
    e.userAgent
FROM staging_events e
LEFT JOIN staging_songs s
    ON e.artist = s.artist_name
   AND e.song = s.title
WHERE e.page = 'NextSong'"#;

const INSERT_USERS: &str = r#"
INSERT INTO users (user_id, first_name, last_name, gender, level)
SELECT DISTINCT
    e.userId,
    e.firstName,
    e.lastName,
    e.gender,
    e.level
FROM staging_events e
WHERE e.userId IS NOT NULL"#;

const INSERT_SONGS: &str = r#"
INSERT INTO songs (song_id, title, artist_id, year, duration)
SELECT DISTINCT
    s.song_id,
    s.title,
    s.artist_id,
    s.year,
    s.duration
FROM staging_songs s"#;

const INSERT_ARTISTS: &str = r#"
INSERT INTO artists (artist_id, name, location, latitude, longitude)
SELECT DISTINCT
    s.artist_id,
    s.artist_name,
    s.artist_location,
    s.artist_latitude,
    s.artist_longitude
FROM staging_songs s"#;

const INSERT_TIMES: &str = r#"
INSERT INTO times (start_time, hour, day, week, month, year, weekday)
SELECT DISTINCT
    p.start_time,
    EXTRACT(hour FROM p.start_time),
    EXTRACT(day FROM p.start_time),
    EXTRACT(week FROM p.start_time),
    EXTRACT(month FROM p.start_time),
    EXTRACT(year FROM p.start_time),
    EXTRACT(weekday FROM p.start_time)
FROM songplays p"#;

pub fn drop_statements() -> Vec<Statement> {
    TABLES
        .iter()
        .map(|t| Statement::new(format!("drop {t}"), format!("DROP TABLE IF EXISTS {t}")))
        .collect()
}

pub fn create_statements() -> Vec<Statement> {
    [
        (STAGING_EVENTS, CREATE_STAGING_EVENTS),
        (STAGING_SONGS, CREATE_STAGING_SONGS),
        (SONGPLAYS, CREATE_SONGPLAYS),
        (USERS, CREATE_USERS),
        (SONGS, CREATE_SONGS),
        (ARTISTS, CREATE_ARTISTS),
        (TIMES, CREATE_TIMES),
    ]
    .into_iter()
    .map(|(t, sql)| Statement::new(format!("create {t}"), sql))
    .collect()
}

/// Fact table first: `times` reads from `songplays`.
pub fn insert_statements() -> Vec<Statement> {
    [
        (SONGPLAYS, INSERT_SONGPLAYS),
        (USERS, INSERT_USERS),
        (SONGS, INSERT_SONGS),
        (ARTISTS, INSERT_ARTISTS),
        (TIMES, INSERT_TIMES),
    ]
    .into_iter()
    .map(|(t, sql)| Statement::new(format!("insert {t}"), sql))
    .collect()
}

/// Where the staging data lives and the credentials COPY runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    pub log_data: String,
    pub log_jsonpath: String,
    pub song_data: String,
    pub role_arn: String,
    pub region: String,
}

impl CopySource {
    pub fn new(s3: &S3Config, role_arn: &str, region: &str) -> Self {
        Self {
            log_data: s3.log_data.clone(),
            log_jsonpath: s3.log_jsonpath.clone(),
            song_data: s3.song_data.clone(),
            role_arn: role_arn.to_string(),
            region: region.to_string(),
        }
    }

    /// Events use an explicit JSONPaths file; songs map by column name.
    pub fn copy_statements(&self) -> Vec<Statement> {
        let events = format!(
            "COPY {STAGING_EVENTS}\nFROM {}\nIAM_ROLE {}\nFORMAT AS JSON {}\nREGION {}",
            quote(&self.log_data),
            quote(&self.role_arn),
            quote(&self.log_jsonpath),
            quote(&self.region),
        );
        let songs = format!(
            "COPY {STAGING_SONGS}\nFROM {}\nIAM_ROLE {}\nFORMAT AS JSON 'auto'\nREGION {}",
            quote(&self.song_data),
            quote(&self.role_arn),
            quote(&self.region),
        );
        vec![
            Statement::new(format!("copy {STAGING_EVENTS}"), events),
            Statement::new(format!("copy {STAGING_SONGS}"), songs),
        ]
    }
}

/// Single-quoted SQL literal. Values already wrapped in quotes are taken as is.
fn quote(value: &str) -> String {
    let inner = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value);
    format!("'{}'", inner.replace('\'', "''"))
}
