diesel::table! {
    sessions (id) {
        id -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    datasets (id) {
        id -> Text,
        session_id -> Text,
        filename -> Text,
        format -> Text,
        column_schema -> Jsonb,
        row_count -> Int8,
        preview -> Jsonb,
        source -> Bytea,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    chat_turns (id) {
        id -> Uuid,
        session_id -> Text,
        dataset_id -> Text,
        filename -> Text,
        question -> Text,
        result -> Jsonb,
        report -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(datasets -> sessions (session_id));
diesel::joinable!(chat_turns -> sessions (session_id));

diesel::allow_tables_to_appear_in_same_query!(sessions, datasets, chat_turns);
