use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use x402_openai::config::ClientConfig;
use x402_openai::policy::{max_amount, prefer_network};
use x402_openai::wallets::{EvmWallet, SvmWallet, Wallet};
use x402_openai::{BlockingX402OpenAI, X402OpenAI, X402OpenAIBuilder};

#[derive(Parser, Debug)]
#[command(name = "x402-openai-demo", about = "Pay for OpenAI-compatible calls with x402")]
struct Args {
    /// JSON client configuration; wallets are read from the environment when absent.
    #[arg(long, short, env = "X402_CONFIG")]
    config: Option<PathBuf>,

    /// Prefer paying on this network (CAIP-2 id, pattern, or network name).
    #[arg(long, env = "X402_PREFER_NETWORK")]
    prefer_network: Option<String>,

    /// Refuse payments above this amount, in the token's smallest unit.
    #[arg(long, env = "X402_MAX_AMOUNT", default_value_t = 1_000_000)]
    max_amount: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one chat completion through the async client.
    Chat {
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
        prompt: String,
    },
    /// List models through the blocking client.
    Models,
}

fn wallets_from_env() -> Result<Vec<Arc<dyn Wallet>>, Box<dyn std::error::Error>> {
    let mut wallets: Vec<Arc<dyn Wallet>> = Vec::new();
    if let Ok(private_key) = std::env::var("EVM_PRIVATE_KEY") {
        let wallet = EvmWallet::from_private_key(private_key);
        println!("Using EVM wallet {}", wallet.address()?);
        wallets.push(Arc::new(wallet));
    } else if let Ok(mnemonic) = std::env::var("MNEMONIC") {
        let wallet = EvmWallet::from_mnemonic(mnemonic, 0);
        println!("Using EVM wallet {}", wallet.address()?);
        wallets.push(Arc::new(wallet));
    }
    if let Ok(private_key) = std::env::var("SVM_PRIVATE_KEY") {
        let mut wallet = SvmWallet::new(private_key)?;
        if let Ok(rpc_url) = std::env::var("SOLANA_RPC_URL") {
            wallet = wallet.with_rpc_url(rpc_url);
        }
        println!("Using Solana wallet {}", wallet.pubkey()?);
        wallets.push(Arc::new(wallet));
    }
    Ok(wallets)
}

fn configure<C>(
    builder: X402OpenAIBuilder<C>,
    args: &Args,
) -> Result<X402OpenAIBuilder<C>, Box<dyn std::error::Error>> {
    let builder = match &args.config {
        Some(path) => builder.from_config(&ClientConfig::load_from_path(path)?)?,
        None => builder.wallets(wallets_from_env()?),
    };
    let builder = match &args.prefer_network {
        Some(network) => builder.policy(prefer_network(network)),
        None => builder,
    };
    Ok(builder.policy(max_amount(args.max_amount)))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match &args.command {
        Command::Chat { model, prompt } => {
            let client = configure(X402OpenAI::builder(), &args)?.build()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async {
                let response = client
                    .post("chat/completions")
                    .json(&serde_json::json!({
                        "model": model,
                        "messages": [{"role": "user", "content": prompt}],
                    }))
                    .send()
                    .await?;
                println!("Status: {}", response.status());
                println!("{}", response.text().await?);
                Ok::<_, Box<dyn std::error::Error>>(())
            })?;
            client.close();
        }
        Command::Models => {
            let client = configure(BlockingX402OpenAI::builder(), &args)?.build()?;
            let response = client.get("models")?;
            println!("Status: {}", response.status());
            println!("{}", String::from_utf8_lossy(response.body()));
            client.close();
        }
    }
    Ok(())
}
