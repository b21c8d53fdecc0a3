use allmeet::{
    endpoints::{self, Credentials, Registration},
    AccountManager, Config, FileStorage, NetworkErrorPolicy, SessionStore,
    UserType,
};
use anyhow::{Context, Error};
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;
use tokio_util::sync::CancellationToken;
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    let args = Args::from_args();

    log::debug!("Talking to {}", args.api_url);

    let client = Client::builder()
        .user_agent(allmeet::DEFAULT_USER_AGENT)
        .build()?;
    let storage_path = args.storage_path()?;
    let storage = FileStorage::open(&storage_path).with_context(|| {
        format!("Unable to open {}", storage_path.display())
    })?;
    let store = SessionStore::new(client, args.config(), Arc::new(storage));

    // every screen waits for this before deciding whether to show the login
    // page
    store.validate_session().await;

    match args.cmd {
        Command::Register {
            name,
            email,
            username,
            password,
            confirm_password,
            student_id,
            professor,
        } => {
            let registration = Registration {
                student_id,
                name,
                email,
                username,
                password,
                user_type: if professor {
                    UserType::Professor
                } else {
                    UserType::Student
                },
            };
            registration.validate(&confirm_password)?;

            let registered = endpoints::register(
                store.client(),
                store.api_url(),
                &registration,
            )
            .await?;
            println!("{}", registered.message);
        },
        Command::Login {
            username,
            password,
            remember_me,
        } => {
            let credentials = Credentials::new(username.as_str(), password);
            let logged_in =
                endpoints::login(store.client(), store.api_url(), &credentials)
                    .await?;

            let name = logged_in.user.name.clone();
            store.login(logged_in.user, logged_in.access_token)?;
            store.remember_login(if remember_me {
                Some(username.as_str())
            } else {
                None
            })?;

            println!("Welcome, {}!", name);
        },
        Command::Logout => {
            store.logout()?;
            println!("Logged out");
        },
        Command::Whoami => {
            let mut account = logged_in(&store)?;
            account.load(&CancellationToken::new()).await?;

            let form = account.form();
            println!("{} <{}>", form.name, form.email);
            if let Some(student_id) = &form.student_id {
                println!("Student ID: {}", student_id);
            }
            if let Some(image) = account.profile_image() {
                println!("Profile image: {}", image);
            }
        },
        Command::UpdateProfile { name, email } => {
            let mut account = logged_in(&store)?;
            if let Some(name) = name {
                account.form_mut().name = name;
            }
            if let Some(email) = email {
                account.form_mut().email = email;
            }

            println!("{}", account.save().await?);
        },
        Command::SetAvatar { color, url, clear } => {
            let mut account = logged_in(&store)?;
            match (color, url) {
                (Some(color), _) => account.select_color(&color),
                (None, Some(url)) => account.select_image(url),
                (None, None) if clear => account.clear_image(),
                (None, None) => {
                    anyhow::bail!("Pass one of --color, --url or --clear")
                },
            }

            println!("{}", account.save().await?);
        },
        Command::ChangePassword {
            current_password,
            new_password,
            confirm_password,
        } => {
            let account = logged_in(&store)?;
            let message = account
                .change_password(
                    &current_password,
                    &new_password,
                    &confirm_password,
                )
                .await?;

            println!("{}", message);
        },
        Command::DeleteAccount {
            identifier,
            password,
        } => {
            let account = logged_in(&store)?;
            println!("{}", account.delete_account(&identifier, &password).await?);
        },
    }

    Ok(())
}

fn logged_in(store: &SessionStore) -> Result<AccountManager, Error> {
    if !store.session().is_logged_in() {
        anyhow::bail!("Not logged in. Run the \"login\" command first.");
    }

    Ok(AccountManager::new(store.clone()))
}

#[derive(Debug, StructOpt)]
struct Args {
    #[structopt(
        long = "api-url",
        env = "ALLMEET_API_URL",
        default_value = "http://localhost:5000",
        help = "The All Meet server to talk to"
    )]
    api_url: Url,
    #[structopt(
        long = "storage",
        parse(from_os_str),
        help = "Where to keep the session between runs"
    )]
    storage: Option<PathBuf>,
    #[structopt(
        long = "keep-session-when-offline",
        help = "Don't log out just because the server can't be reached"
    )]
    keep_session_when_offline: bool,
    #[structopt(subcommand)]
    cmd: Command,
}

impl Args {
    fn config(&self) -> Config {
        let policy = if self.keep_session_when_offline {
            NetworkErrorPolicy::KeepSession
        } else {
            NetworkErrorPolicy::Purge
        };

        Config::new(self.api_url.clone()).with_network_error_policy(policy)
    }

    fn storage_path(&self) -> Result<PathBuf, Error> {
        if let Some(path) = &self.storage {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .context("Unable to find a data directory, pass --storage")?;

        Ok(data_dir.join("allmeet").join("storage.json"))
    }
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Create a new account.
    Register {
        #[structopt(long)]
        name: String,
        #[structopt(long)]
        email: String,
        #[structopt(long)]
        username: String,
        #[structopt(long)]
        password: String,
        #[structopt(long = "confirm-password")]
        confirm_password: String,
        #[structopt(long = "student-id")]
        student_id: Option<String>,
        #[structopt(long, help = "Register as a professor")]
        professor: bool,
    },
    /// Log in and remember the session.
    Login {
        #[structopt(short, long)]
        username: String,
        #[structopt(short, long)]
        password: String,
        #[structopt(long = "remember-me")]
        remember_me: bool,
    },
    Logout,
    /// Show the logged in user's profile.
    Whoami,
    UpdateProfile {
        #[structopt(long)]
        name: Option<String>,
        #[structopt(long)]
        email: Option<String>,
    },
    /// Change the profile image.
    SetAvatar {
        #[structopt(long, help = "A hex colour such as #a855f7")]
        color: Option<String>,
        #[structopt(long)]
        url: Option<String>,
        #[structopt(long)]
        clear: bool,
    },
    ChangePassword {
        #[structopt(long = "current-password")]
        current_password: String,
        #[structopt(long = "new-password")]
        new_password: String,
        #[structopt(long = "confirm-password")]
        confirm_password: String,
    },
    /// Permanently delete the account.
    DeleteAccount {
        #[structopt(long)]
        identifier: String,
        #[structopt(long)]
        password: String,
    },
}
