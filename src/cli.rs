//! Command-line interface definitions and argument parsing

use clap::Parser;

/// Point-of-sale sales analytics and K-Means transaction segmentation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file of transactions
    #[arg(short, long, default_value = "sales.csv")]
    pub input: String,

    /// Number of segments for K-Means
    #[arg(short = 'k', long, default_value = "3")]
    pub clusters: usize,

    /// Seed for K-Means initialization
    #[arg(short, long, default_value = "42")]
    pub seed: u64,

    /// Number of top products to print
    #[arg(short, long, default_value = "5")]
    pub top: usize,

    /// Write every computed table to this JSON file
    #[arg(short, long)]
    pub json: Option<String>,

    /// Classify a new transaction: amount, quantity and distinct products as comma-separated values
    /// Example: --predict "12.5,3,2"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the `--predict` vector
    /// Expected format: "amount,quantity,products"
    pub fn parse_predict_values(&self) -> anyhow::Result<Option<[f64; 3]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            anyhow::bail!("Predict values must be in format 'amount,quantity,products'");
        }

        let mut values = [0.0; 3];
        for (slot, (part, name)) in values
            .iter_mut()
            .zip(parts.iter().zip(["amount", "quantity", "products"]))
        {
            *slot = part
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, part))?;
        }

        Ok(Some(values))
    }
}
