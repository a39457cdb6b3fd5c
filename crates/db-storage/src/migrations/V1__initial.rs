use barrel::backend::Pg;
use barrel::{types, Migration};

pub fn migration() -> String {
    let mut migr = Migration::new();

    migr.create_table("events", |table| {
        table.add_column("id", types::custom("SERIAL").primary(true));
        table.add_column("held_on", types::custom("TIMESTAMPTZ").nullable(false));
        table.add_column("name", types::varchar(512).nullable(false));
        table.add_column("description", types::varchar(2048).nullable(false));
        table.add_column("needs_registration", types::boolean().nullable(false));
        table.add_column("kind", types::varchar(25).nullable(false));
        table.add_column("duration", types::integer().nullable(true));
        table.add_column("speaker", types::varchar(512).nullable(true));
        table.add_column("location", types::varchar(2048).nullable(true));
        table.add_column("status", types::varchar(25).nullable(false));
        table.add_column(
            "created_at",
            types::custom("TIMESTAMPTZ NOT NULL DEFAULT now()"),
        );
        table.inject_custom("CONSTRAINT events_uk UNIQUE (held_on, name)");
    });

    migr.create_table("registrations", |table| {
        table.add_column("id", types::custom("SERIAL").primary(true));
        table.add_column(
            "event_id",
            types::custom("INTEGER NOT NULL REFERENCES events(id)"),
        );
        table.add_column("email", types::varchar(1024).nullable(false));
        table.add_column("name", types::varchar(512).nullable(false));
        table.add_column("first_name", types::varchar(512).nullable(true));
        table.add_column("subscribe_to_newsletter", types::boolean().nullable(false));
        table.add_column(
            "created_at",
            types::custom("TIMESTAMPTZ NOT NULL DEFAULT now()"),
        );
        table.inject_custom("CONSTRAINT registrations_uk UNIQUE (event_id, email)");
    });

    migr.make::<Pg>()
}
