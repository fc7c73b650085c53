use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use lectern_client::{
    api::{
        AuthToken, CommentId, ContentItem, ContentKind, Db, ItemId, NewSession, NewUser,
        ProfileUpdate, Role, UserId, Uuid,
    },
    publish_ebook, publish_video, ContentList, EbookDraft, EngagementStore, ItemView, Overview,
    Scope, VideoDraft,
};

mod remote;

use remote::RemoteDb;

#[derive(structopt::StructOpt)]
#[structopt(name = "lectern-ctl", about = "Command-line access to a lectern server")]
struct Opt {
    #[structopt(short, long, env = "LECTERN_HOST")]
    host: String,

    /// Give up on requests taking longer than this
    #[structopt(long, default_value = "30")]
    timeout_secs: u64,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user, needs ADMIN_TOKEN
    CreateUser {
        display_name: String,
        email: String,

        /// Initial password
        initial_password: String,

        /// One of student, lecturer or admin
        #[structopt(long, default_value = "student")]
        role: Role,
    },

    /// Delete a user and close their sessions, needs ADMIN_TOKEN. What they
    /// published stays.
    DeleteUser { id: Uuid },

    /// Open a session and print its token, to be exported as LECTERN_TOKEN
    Login {
        email: String,
        password: String,

        #[structopt(long, default_value = "lectern-ctl")]
        device: String,
    },

    /// Close the session of LECTERN_TOKEN
    Logout,

    Whoami,

    /// Change my display name. Comments already posted keep the old one.
    UpdateProfile { display_name: String },

    /// List users, optionally only those with one role
    Users {
        #[structopt(long)]
        role: Option<Role>,
    },

    /// Count users and items
    Overview,

    /// List videos or ebooks
    List {
        kind: ContentKind,

        /// Only show the items I published
        #[structopt(long)]
        mine: bool,

        /// Only show items whose title or description contain this
        #[structopt(long)]
        search: Option<String>,
    },

    /// Show one item with its comments
    Show {
        kind: ContentKind,
        id: Uuid,

        /// Show every comment rather than the first few
        #[structopt(long)]
        all_comments: bool,
    },

    PublishVideo {
        title: String,
        description: String,

        /// Link to the video, eg. a YouTube URL
        #[structopt(long)]
        link: Option<String>,

        /// Video file to upload, used rather than the link if both are set
        #[structopt(long)]
        file: Option<PathBuf>,

        #[structopt(long)]
        transcript: Option<String>,
    },

    PublishEbook {
        title: String,
        description: String,

        #[structopt(long)]
        pdf: Option<PathBuf>,

        /// Cover image
        #[structopt(long)]
        cover: Option<PathBuf>,
    },

    Like {
        kind: ContentKind,
        id: Uuid,
    },

    Comment {
        kind: ContentKind,
        id: Uuid,
        text: String,
    },

    Reply {
        kind: ContentKind,
        id: Uuid,
        comment: Uuid,
        text: String,
    },

    DeleteComment {
        kind: ContentKind,
        id: Uuid,
        comment: Uuid,
    },

    Edit {
        kind: ContentKind,
        id: Uuid,
        title: String,
        description: String,
    },

    Delete {
        kind: ContentKind,
        id: Uuid,
    },
}

fn token_from_env(var: &str) -> anyhow::Result<AuthToken> {
    let tok = std::env::var(var).with_context(|| format!("retrieving {var} environment variable"))?;
    let tok = Uuid::try_parse(&tok).with_context(|| format!("parsing {var} as an auth token"))?;
    Ok(AuthToken(tok))
}

fn read_file(path: Option<PathBuf>) -> anyhow::Result<Option<Vec<u8>>> {
    path.map(|p| std::fs::read(&p).with_context(|| format!("reading {p:?}")))
        .transpose()
}

fn print_item(item: &ContentItem) {
    println!(
        "{} {} {:?} by {} on {} ({} likes, {} comments)",
        item.kind.as_str(),
        item.id.0,
        item.title,
        item.owner_name,
        item.date.format("%Y-%m-%d"),
        item.likes,
        item.comments.len(),
    );
}

fn print_view(view: &ItemView) {
    let item = view.item();
    print_item(item);
    println!("  {}", view.description_preview());
    match item.embed_url() {
        Some(url) => println!("  embed: {url}"),
        None => println!("  url: {}", item.url),
    }
    if let Some(img) = &item.image_url {
        println!("  cover: {img}");
    }
    if let Some(t) = view.transcript_preview() {
        println!("  transcript: {t}");
    }
    for c in view.displayed_comments() {
        println!(
            "  [{}] {} on {}: {}",
            c.id.0,
            c.author_name,
            c.date.format("%Y-%m-%d %H:%M"),
            c.text
        );
        for r in &c.replies {
            println!("      [{}] {}: {}", r.id.0, r.author_name, r.text);
        }
    }
    if view.has_more_comments() {
        println!("  ... use --all-comments to see the rest");
    }
}

async fn store(db: &mut RemoteDb, kind: ContentKind, id: Uuid) -> anyhow::Result<EngagementStore> {
    let item = db
        .fetch_item(kind, ItemId(id))
        .await
        .with_context(|| format!("fetching {} {id}", kind.as_str()))?;
    Ok(EngagementStore::new(item))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let host = String::from(opt.host.trim_end_matches('/'));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(opt.timeout_secs))
        .build()
        .context("building http client")?;

    match opt.cmd {
        Command::CreateUser {
            display_name,
            email,
            initial_password,
            role,
        } => {
            let user = NewUser::new(
                UserId(Uuid::new_v4()),
                display_name,
                email,
                role,
                initial_password,
            );
            user.validate().context("validating user")?;
            let resp = client
                .post(format!("{host}/api/admin/create-user"))
                .json(&user)
                .bearer_auth(token_from_env("ADMIN_TOKEN")?.0)
                .send()
                .await
                .context("sending user creation request")?;
            let status = resp.status();
            let body = resp.bytes().await.context("reading server response")?;
            remote::decode::<()>(status, &body).context("creating user")?;
            println!("{}", user.id.0);
            return Ok(());
        }
        Command::DeleteUser { id } => {
            remote::delete_user(&client, &host, token_from_env("ADMIN_TOKEN")?, UserId(id))
                .await
                .with_context(|| format!("deleting user {id}"))?;
            return Ok(());
        }
        Command::Login {
            email,
            password,
            device,
        } => {
            let token = remote::login(&client, &host, &NewSession::new(email, password, device))
                .await
                .context("logging in")?;
            println!("{}", token.0);
            return Ok(());
        }
        _ => (),
    }

    let mut db = RemoteDb::connect(client, host, token_from_env("LECTERN_TOKEN")?)
        .await
        .context("recovering session")?;
    // only the commands above run without a session
    match opt.cmd {
        Command::CreateUser { .. } | Command::DeleteUser { .. } | Command::Login { .. } => (),
        Command::Logout => db.logout().await.context("logging out")?,
        Command::Whoami => {
            if let Some(u) = db.current_user() {
                println!("{} {} <{}> {}", u.id.0, u.display_name, u.email, u.role.as_str());
            }
        }
        Command::UpdateProfile { display_name } => {
            let u = db
                .update_profile(ProfileUpdate { display_name })
                .await
                .context("updating profile")?;
            println!("{} {} <{}> {}", u.id.0, u.display_name, u.email, u.role.as_str());
        }
        Command::Users { role } => {
            for u in db.list_users().await.context("listing users")? {
                if role.map(|r| r == u.role).unwrap_or(true) {
                    println!("{} {} <{}> {}", u.id.0, u.display_name, u.email, u.role.as_str());
                }
            }
        }
        Command::Overview => {
            let o = Overview::load(&mut db).await.context("loading overview")?;
            println!("users:     {}", o.users());
            println!("students:  {}", o.students);
            println!("lecturers: {}", o.lecturers);
            println!("admins:    {}", o.admins);
            println!("videos:    {}", o.videos);
            println!("ebooks:    {}", o.ebooks);
        }
        Command::List { kind, mine, search } => {
            let scope = if mine { Scope::Mine } else { Scope::All };
            let mut list = ContentList::load(&mut db, kind, scope)
                .await
                .with_context(|| format!("listing {}", kind.collection()))?;
            if let Some(q) = search {
                list.set_query(q);
            }
            for v in list.visible() {
                print_item(v.item());
            }
        }
        Command::Show {
            kind,
            id,
            all_comments,
        } => {
            let mut view = ItemView::new(store(&mut db, kind, id).await?);
            if all_comments && view.has_more_comments() {
                view.toggle_comments();
            }
            print_view(&view);
        }
        Command::PublishVideo {
            title,
            description,
            link,
            file,
            transcript,
        } => {
            let draft = VideoDraft {
                title,
                description,
                transcript,
                link,
                file: read_file(file)?,
            };
            let item = publish_video(&mut db, draft)
                .await
                .context("publishing video")?;
            println!("{}", item.id.0);
        }
        Command::PublishEbook {
            title,
            description,
            pdf,
            cover,
        } => {
            let draft = EbookDraft {
                title,
                description,
                pdf: read_file(pdf)?,
                cover: read_file(cover)?,
            };
            let item = publish_ebook(&mut db, draft)
                .await
                .context("publishing ebook")?;
            println!("{}", item.id.0);
        }
        Command::Like { kind, id } => {
            let mut s = store(&mut db, kind, id).await?;
            if !s.toggle_like(&mut db).await.context("liking item")? {
                println!("already liked");
            }
            println!("{} likes", s.likes());
        }
        Command::Comment { kind, id, text } => {
            let mut s = store(&mut db, kind, id).await?;
            let c = s
                .add_comment(&mut db, &text)
                .await
                .context("adding comment")?;
            println!("{}", c.0);
        }
        Command::Reply {
            kind,
            id,
            comment,
            text,
        } => {
            let mut s = store(&mut db, kind, id).await?;
            let r = s
                .add_reply(&mut db, CommentId(comment), &text)
                .await
                .context("adding reply")?;
            println!("{}", r.0);
        }
        Command::DeleteComment { kind, id, comment } => {
            let mut s = store(&mut db, kind, id).await?;
            s.delete_comment(&mut db, CommentId(comment))
                .await
                .context("deleting comment")?;
        }
        Command::Edit {
            kind,
            id,
            title,
            description,
        } => {
            let mut s = store(&mut db, kind, id).await?;
            s.edit_item(&mut db, &title, &description)
                .await
                .context("editing item")?;
            print_item(s.item());
        }
        Command::Delete { kind, id } => {
            let s = store(&mut db, kind, id).await?;
            s.delete_item(&mut db).await.context("deleting item")?;
        }
    }

    Ok(())
}
