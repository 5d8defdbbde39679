// Diesel table definitions for the daily-rotated SQLite store.

diesel::table! {
    adsb_targets (id) {
        id -> BigInt,
        hex -> Text,
        flight -> Text,
        lat -> Double,
        lon -> Double,
        alt_baro -> Double,
        alt_geom -> Double,
        gs -> Double,
        tas -> Double,
        true_heading -> Double,
        mag_heading -> Double,
        track -> Double,
        baro_rate -> Double,
        squawk -> Text,
        category -> Text,
        on_ground -> Bool,
        source -> Text,
        timestamp -> TimestamptzSqlite,
    }
}

diesel::table! {
    phase_changes (id) {
        id -> BigInt,
        hex -> Text,
        flight -> Text,
        phase -> Text,
        timestamp -> TimestamptzSqlite,
        event_type -> Nullable<Text>,
        adsb_id -> Nullable<BigInt>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(adsb_targets, phase_changes);
