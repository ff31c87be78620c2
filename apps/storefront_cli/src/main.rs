use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use shared::domain::{CategoryId, Money, ProductId, SubCategoryId};
use storefront_core::{
    load_config, CartSnapshot, CatalogScope, FilterState, PageState, ProductRef, QueryOutcome,
    QueryResult, StorefrontClient, StorefrontConfig,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Browse a storefront catalog and edit a cart")]
struct Cli {
    /// Overrides `api_base_url` from storefront.toml / STOREFRONT_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    user_id: Option<String>,
    #[arg(long, global = true)]
    token: Option<String>,
    #[arg(long, global = true)]
    location: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List products, optionally narrowed by category, price or rating.
    Browse(BrowseArgs),
    Search {
        text: String,
    },
    #[command(subcommand)]
    Cart(CartCommand),
}

#[derive(Args, Debug, Default)]
struct BrowseArgs {
    #[arg(long, conflicts_with = "sub_category")]
    category: Option<String>,
    #[arg(long)]
    sub_category: Option<String>,
    #[arg(long, requires = "max_price")]
    min_price: Option<u64>,
    #[arg(long, requires = "min_price")]
    max_price: Option<u64>,
    #[arg(long, conflicts_with = "min_price")]
    rating: Option<u8>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    per_page: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum CartCommand {
    Show,
    Add {
        product_id: String,
        #[arg(default_value_t = 1)]
        quantity: u32,
        /// Unit price shown until the server confirms its own.
        #[arg(long, default_value_t = 0)]
        price: u64,
    },
    Update {
        product_id: String,
        quantity: u32,
    },
    Remove {
        product_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut config = load_config()?;
    apply_overrides(&mut config, &cli);
    debug!(api = %config.api_base_url, "storefront config loaded");
    let client = StorefrontClient::new(config)?;

    match cli.command {
        Command::Browse(args) => browse(&client, &args).await,
        Command::Search { text } => search(&client, &text).await,
        Command::Cart(command) => cart(&client, command).await,
    }
}

fn apply_overrides(config: &mut StorefrontConfig, cli: &Cli) {
    if let Some(v) = &cli.api_url {
        config.api_base_url = v.clone();
    }
    if let Some(v) = &cli.user_id {
        config.user_id = Some(v.clone());
    }
    if let Some(v) = &cli.token {
        config.access_token = Some(v.clone());
    }
    if let Some(v) = &cli.location {
        config.location = Some(v.clone());
    }
}

fn filter_from_args(args: &BrowseArgs, location: Option<String>) -> FilterState {
    let scope = match (&args.category, &args.sub_category) {
        (Some(id), _) => Some(CatalogScope::Category(CategoryId::new(id.as_str()))),
        (None, Some(id)) => Some(CatalogScope::SubCategory(SubCategoryId::new(id.as_str()))),
        (None, None) => None,
    };
    let filter = match (args.min_price, args.max_price, args.rating) {
        (Some(min), Some(max), _) => FilterState::price_range(Money(min), Money(max), scope),
        (_, _, Some(rating)) => FilterState::rating(rating, scope),
        _ => match scope {
            Some(CatalogScope::Category(id)) => FilterState::category(id),
            Some(CatalogScope::SubCategory(id)) => FilterState::sub_category(id),
            None => FilterState::all(),
        },
    };
    filter.with_location(location)
}

async fn browse(client: &StorefrontClient, args: &BrowseArgs) -> Result<()> {
    let filter = filter_from_args(args, client.config().location.clone());
    filter.validate()?;
    let per_page = args.per_page.unwrap_or(client.config().default_per_page);
    let page = PageState::new(args.page, per_page)?;
    let catalog = client.catalog_with(filter, page);
    let result = committed(catalog.refresh().outcome().await)?;
    print_products(&result);
    Ok(())
}

async fn search(client: &StorefrontClient, text: &str) -> Result<()> {
    let catalog = client.catalog()?;
    let result = committed(catalog.search(text)?.outcome().await)?;
    print_products(&result);
    Ok(())
}

fn committed(outcome: QueryOutcome) -> Result<QueryResult> {
    match outcome {
        QueryOutcome::Committed(result) => Ok(result),
        QueryOutcome::Failed(err) => Err(err).context("catalog query failed"),
        QueryOutcome::Superseded => bail!("catalog query was superseded"),
    }
}

fn print_products(result: &QueryResult) {
    if result.is_empty() {
        println!("no products (page {})", result.page);
        return;
    }
    for product in &result.items {
        let rating = product
            .rating
            .map(|r| format!("{r:.1}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<14} {:>10} {:>4}  {}",
            product.id, product.price, rating, product.name
        );
    }
    println!(
        "page {} ({} per page), {} matching",
        result.page, result.per_page, result.total
    );
}

async fn cart(client: &StorefrontClient, command: CartCommand) -> Result<()> {
    let cart = client.cart()?;
    cart.load().await.context("failed to load cart")?;

    let snapshot = match command {
        CartCommand::Show => cart.snapshot(),
        CartCommand::Add {
            product_id,
            quantity,
            price,
        } => {
            let product = ProductRef::new(ProductId::new(product_id), Money(price));
            cart.add_line(product, quantity)?.settled().await?
        }
        CartCommand::Update {
            product_id,
            quantity,
        } => {
            let local_id = line_for(&cart.snapshot(), &product_id)?;
            cart.update_line(local_id, quantity)?.settled().await?
        }
        CartCommand::Remove { product_id } => {
            let local_id = line_for(&cart.snapshot(), &product_id)?;
            cart.remove_line(local_id)?.settled().await?
        }
    };
    print_cart(&snapshot);
    Ok(())
}

fn line_for(snapshot: &CartSnapshot, product_id: &str) -> Result<storefront_core::LocalLineId> {
    snapshot
        .line_for_product(&ProductId::new(product_id))
        .map(|line| line.local_id)
        .ok_or_else(|| anyhow!("product {product_id} is not in the cart"))
}

fn print_cart(snapshot: &CartSnapshot) {
    if snapshot.is_empty() {
        println!("cart is empty");
        return;
    }
    for line in snapshot.lines() {
        println!(
            "{:<14} x{:<4} {:>10} {:>10}  {}",
            line.product_id,
            line.quantity,
            line.unit_price,
            line.subtotal,
            line.title.as_deref().unwrap_or("")
        );
    }
    println!("total {}", snapshot.total());
}
