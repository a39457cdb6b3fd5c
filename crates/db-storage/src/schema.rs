table! {
    events (id) {
        id -> Int4,
        held_on -> Timestamptz,
        name -> Varchar,
        description -> Varchar,
        needs_registration -> Bool,
        kind -> Text,
        duration -> Nullable<Int4>,
        speaker -> Nullable<Varchar>,
        location -> Nullable<Varchar>,
        status -> Text,
        created_at -> Timestamptz,
    }
}

table! {
    registrations (id) {
        id -> Int4,
        event_id -> Int4,
        email -> Varchar,
        name -> Varchar,
        first_name -> Nullable<Varchar>,
        subscribe_to_newsletter -> Bool,
        created_at -> Timestamptz,
    }
}

joinable!(registrations -> events (event_id));

allow_tables_to_appear_in_same_query!(events, registrations);
