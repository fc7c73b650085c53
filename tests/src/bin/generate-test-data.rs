//! Prints SQL filling a freshly migrated lectern database with random users,
//! videos and ebooks. Every user's password is `password`.

use chrono::{Duration, SecondsFormat, Utc};
use lectern_api::{
    CommentId, ContentItem, ContentKind, Event, EventData, ItemId, NewItem, NewUser, Role, Time,
    UserId, Uuid,
};
use rand::{seq::SliceRandom, Rng};

const NUM_STUDENTS: usize = 12;
const NUM_LECTURERS: usize = 4;

const NUM_VIDEOS: usize = 30;
const NUM_EBOOKS: usize = 20;
const TITLE_LEN: usize = 6;
const DESCRIPTION_LEN: usize = 60;
const TRANSCRIPT_LEN: usize = 400;

const MAX_LIKES: usize = 10;
const MAX_COMMENTS: usize = 12;
const MAX_REPLIES: usize = 3;
const COMMENT_LEN: usize = 25;

const YOUTUBE_IDS: &[&str] = &["dQw4w9WgXcQ", "9bZkp7q19f0", "kJQP7kiw5Fk", "M7lc1UVf-VE"];

fn sql_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn date_column(date: &Time) -> String {
    sql_str(&date.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

fn gen_n_items(table: &str, rows: impl IntoIterator<Item = String>) {
    println!("INSERT INTO {} VALUES", table);
    for (i, r) in rows.into_iter().enumerate() {
        if i != 0 {
            println!(",");
        }
        print!("    {}", r);
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn gen_user(rng: &mut impl Rng, i: usize, role: Role) -> NewUser {
    let name = lipsum::lipsum_title_with_rng(&mut *rng);
    NewUser::new(
        UserId(Uuid::new_v4()),
        name,
        format!("{}{i}@example.org", role.as_str()),
        role,
        String::from("password"),
    )
}

fn gen_item(rng: &mut impl Rng, kind: ContentKind, owner: &NewUser, date: Time) -> ContentItem {
    let id = ItemId(Uuid::new_v4());
    let (url, image_url, transcript) = match kind {
        ContentKind::Video => {
            let url = match rng.gen_bool(0.7) {
                true => format!(
                    "https://www.youtube.com/watch?v={}",
                    YOUTUBE_IDS.choose(&mut *rng).unwrap_or(&YOUTUBE_IDS[0])
                ),
                false => format!("/api/blobs/videos/{}", id.0),
            };
            let transcript = rng
                .gen_bool(0.5)
                .then(|| lipsum::lipsum_words_with_rng(&mut *rng, TRANSCRIPT_LEN));
            (url, None, transcript)
        }
        ContentKind::Ebook => (
            format!("/api/blobs/ebooks/{}", id.0),
            Some(format!("/api/blobs/ebookImages/{}", id.0)),
            None,
        ),
    };
    ContentItem::from(NewItem {
        id,
        kind,
        owner_id: owner.id,
        owner_name: owner.display_name.clone(),
        date,
        title: lipsum::lipsum_words_with_rng(&mut *rng, TITLE_LEN),
        description: lipsum::lipsum_words_with_rng(&mut *rng, DESCRIPTION_LEN),
        url,
        image_url,
        transcript,
    })
}

fn later(rng: &mut impl Rng, date: &mut Time) -> Time {
    *date = *date + Duration::minutes(rng.gen_range(1..3000));
    *date
}

/// Runs a random history of likes, comments and replies on `item`
fn engage(rng: &mut impl Rng, item: &mut ContentItem, users: &[NewUser]) {
    let mut date = item.date;
    let mut events = Vec::new();
    let num_likes = rng.gen_range(0..=MAX_LIKES);
    for u in users.choose_multiple(&mut *rng, num_likes) {
        events.push((u, later(rng, &mut date), EventData::Like));
    }
    for _ in 0..rng.gen_range(0..=MAX_COMMENTS) {
        let Some(u) = users.choose(&mut *rng) else { return };
        let id = CommentId::new();
        let text = lipsum::lipsum_words_with_rng(&mut *rng, COMMENT_LEN);
        events.push((
            u,
            later(rng, &mut date),
            EventData::add_comment(id, &u.display_name, &text),
        ));
        for _ in 0..rng.gen_range(0..=MAX_REPLIES) {
            let Some(r) = users.choose(&mut *rng) else { return };
            let text = lipsum::lipsum_words_with_rng(&mut *rng, COMMENT_LEN);
            events.push((
                r,
                later(rng, &mut date),
                EventData::add_reply(id, CommentId::new(), &r.display_name, &text),
            ));
        }
    }
    for (u, date, data) in events {
        let e = Event {
            owner_id: u.id,
            date,
            kind: item.kind,
            item_id: item.id,
            data,
        };
        if let Err(err) = item.submit(&e) {
            eprintln!("skipping event on {:?}: {err}", item.id);
        }
    }
}

fn main() {
    let mut rng = rand::thread_rng();

    let mut users = vec![gen_user(&mut rng, 0, Role::Admin)];
    users.extend((0..NUM_LECTURERS).map(|i| gen_user(&mut rng, i, Role::Lecturer)));
    users.extend((0..NUM_STUDENTS).map(|i| gen_user(&mut rng, i, Role::Student)));
    gen_n_items(
        "users (id, display_name, email, role, password_hash)",
        users.iter().map(|u| {
            format!(
                "({}, {}, {}, {}, {})",
                sql_str(&u.id.0.to_string()),
                sql_str(&u.display_name),
                sql_str(&u.email),
                sql_str(u.role.as_str()),
                sql_str(&u.initial_password_hash),
            )
        }),
    );

    let publishers = users
        .iter()
        .filter(|u| u.role.can_publish())
        .cloned()
        .collect::<Vec<_>>();
    let start = Utc::now() - Duration::days(365);
    let mut items = Vec::new();
    for (kind, n) in [
        (ContentKind::Video, NUM_VIDEOS),
        (ContentKind::Ebook, NUM_EBOOKS),
    ] {
        for _ in 0..n {
            let Some(owner) = publishers.choose(&mut rng) else { continue };
            let date = start + Duration::minutes(rng.gen_range(0..60 * 24 * 300));
            let mut item = gen_item(&mut rng, kind, owner, date);
            engage(&mut rng, &mut item, &users);
            items.push(item);
        }
    }
    gen_n_items(
        "items (id, kind, owner_id, date, revision, body)",
        items.iter().map(|i| {
            let body = serde_json::to_string(i).expect("serializing generated item");
            format!(
                "({}, {}, {}, {}, 0, {})",
                sql_str(&i.id.0.to_string()),
                sql_str(i.kind.as_str()),
                sql_str(&i.owner_id.0.to_string()),
                date_column(&i.date),
                sql_str(&body),
            )
        }),
    );
}
