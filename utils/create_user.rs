use clap::Parser;
use sea_orm::{ConnectionTrait, Database, DbBackend, Statement};
use std::env;

#[derive(Parser)]
#[command(name = "create_user", about = "Creates a user row and prints a bearer token for it")]
struct Args {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: String,
    /// Stripe customer id to attach, if one already exists
    #[arg(long)]
    stripe_customer_id: Option<String>,
    /// Token lifetime in days
    #[arg(long, default_value_t = 30)]
    token_days: i64,
}

#[derive(serde::Serialize)]
struct Claims {
    sub: String,
    exp: usize,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    let db = Database::connect(database_url)
        .await
        .expect("Failed to connect to database");

    let id = uuid::Uuid::new_v4();
    let now = chrono::Utc::now().naive_utc();
    db.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "INSERT INTO users (id, email, name, created_at, stripe_customer_id, subscription_status) \
         VALUES ($1, $2, $3, $4, $5, 'inactive')",
        [
            id.into(),
            args.email.clone().into(),
            args.name.into(),
            now.into(),
            args.stripe_customer_id.into(),
        ],
    ))
    .await
    .expect("Failed to insert user");

    let exp = chrono::Utc::now().timestamp() + args.token_days * 86400;
    let claims = Claims {
        sub: id.to_string(),
        exp: exp as usize,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("Failed to sign token");

    println!("User created");
    println!("  id:    {}", id);
    println!("  email: {}", args.email);
    println!("  token: {}", token);
}
