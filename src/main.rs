//! UPI fraud scoring CLI
//!
//! Trains the convolutional fraud classifier on labeled transaction uploads
//! and scores new uploads with the saved model.

use clap::{Parser, Subcommand};
use upi_fraud::{Config, ErrorResponse, Result};

#[derive(Parser)]
#[command(name = "fraud")]
#[command(about = "UPI transaction fraud scoring using a 1-D convolutional network", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Fit the scaler and classifier on a labeled CSV and save the model
    Train {
        /// Labeled transactions (CSV with an is_fraud column)
        input: String,
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override batch size
        #[arg(long)]
        batch_size: Option<usize>,
        /// Shuffle training batches with this seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a CSV of transactions with the saved model
    Score {
        /// Transactions to score
        input: String,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
        /// Override the suspicious threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Write results to a file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Generate a synthetic labeled dataset
    Synth {
        /// Output CSV path
        output: String,
        /// Number of rows
        #[arg(long, default_value = "1000")]
        rows: usize,
        /// Fraction of rows labeled as fraud
        #[arg(long, default_value = "0.05")]
        fraud_rate: f64,
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn report_error(err: &upi_fraud::FraudError) {
    let response = ErrorResponse::from(err);
    match serde_json::to_string(&response) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("Error: {}", err),
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                report_error(&e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Train {
            input,
            epochs,
            batch_size,
            seed,
        } => commands::train(&config, &input, epochs, batch_size, seed),
        Commands::Score {
            input,
            format,
            threshold,
            output,
        } => commands::score(&config, &input, format, threshold, output),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
        },
        Commands::Synth {
            output,
            rows,
            fraud_rate,
            seed,
        } => commands::synth(&output, rows, fraud_rate, seed),
    };

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;

    use burn::backend::{Autodiff, NdArray};
    use upi_fraud::data::{read_transactions, synthetic_transactions};
    use upi_fraud::predict::{FraudDetector, ModelStore, ScoringOutcome};
    use upi_fraud::FraudError;

    type MyBackend = NdArray<f32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all("model")?;
        println!("Created data/ and model/ directories");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'fraud synth data/transactions.csv' for a sample dataset");
        println!("  3. Run 'fraud train data/transactions.csv' to fit the model");
        println!("  4. Run 'fraud score <uploads.csv>' to score new transactions");

        Ok(())
    }

    pub fn train(
        config: &Config,
        input: &str,
        epochs: Option<usize>,
        batch_size: Option<usize>,
        seed: Option<u64>,
    ) -> Result<()> {
        let mut config = config.clone();
        if let Some(e) = epochs {
            config.training.epochs = e;
        }
        if let Some(b) = batch_size {
            config.training.batch_size = b;
        }
        if seed.is_some() {
            config.training.shuffle_seed = seed;
        }

        let records = read_transactions(input)?;
        println!("Loaded {} transactions from {}", records.len(), input);

        let device = Default::default();
        let mut detector = FraudDetector::<MyAutodiffBackend>::new(&config, device);

        println!("\nStarting training...\n");
        let report = detector.fit(&records)?;

        println!("\nTraining complete!");
        println!("───────────────────────────────");
        println!("  Rows:           {}", report.rows);
        println!("  Fraud rows:     {}", report.fraud_rows);
        if let Some(last) = report.history.last_train() {
            println!("  Train loss:     {:.4}", last.loss);
            println!("  Train accuracy: {:.2}%", last.accuracy * 100.0);
        }
        if let Some(last) = report.history.last_validation() {
            println!("  Val loss:       {:.4}", last.loss);
            println!("  Val accuracy:   {:.2}%", last.accuracy * 100.0);
            match last.auc {
                Some(auc) => println!("  Val AUC:        {:.4}", auc),
                None => println!("  Val AUC:        n/a (single class)"),
            }
        }
        if !report.degenerate_features.is_empty() {
            println!("  Constant cols:  {}", report.degenerate_features.join(", "));
        }

        detector.save(&config.data.model_path)?;
        println!("\nModel saved to {}", config.data.model_path);

        Ok(())
    }

    pub fn score(
        config: &Config,
        input: &str,
        format: OutputFormat,
        threshold: Option<f32>,
        output: Option<String>,
    ) -> Result<()> {
        let device = Default::default();
        let detector =
            FraudDetector::<MyAutodiffBackend>::load(config, &config.data.model_path, device)?;

        let records = read_transactions(input)?;
        let threshold = threshold.unwrap_or(config.scoring.suspicious_threshold);
        let outcome = detector.score_with_threshold(&records, threshold)?;

        let rendered = match format {
            OutputFormat::Table => format_table(&outcome),
            OutputFormat::Json => serde_json::to_string_pretty(&outcome)
                .map_err(|e| FraudError::Io(std::io::Error::other(e.to_string())))?,
            OutputFormat::Csv => format_csv(&outcome)?,
        };

        match output {
            Some(path) => {
                std::fs::write(&path, rendered)?;
                println!(
                    "Wrote {} scored transactions to {} ({} suspicious)",
                    outcome.summary.total, path, outcome.summary.suspicious
                );
            }
            None => print!("{}", rendered),
        }

        Ok(())
    }

    fn format_table(outcome: &ScoringOutcome) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<14} {:<20} {:>14} {:>10}  {}\n",
            "Transaction", "Timestamp", "Amount", "Fraud %", "Flag"
        ));
        out.push_str(&format!("{}\n", "─".repeat(70)));

        for (i, tx) in outcome.transactions.iter().enumerate() {
            let id = tx.transaction_id.clone().unwrap_or_else(|| format!("#{}", i));
            out.push_str(&format!(
                "{:<14} {:<20} {:>14.2} {:>9.1}%  {}\n",
                id,
                tx.timestamp,
                tx.amount,
                tx.fraud_probability * 100.0,
                if tx.suspicious { "SUSPICIOUS" } else { "" }
            ));
        }

        let summary = &outcome.summary;
        out.push_str(&format!("{}\n", "─".repeat(70)));
        out.push_str(&format!(
            "Transactions: {}  Suspicious: {} ({:.1}%)  Threshold: {:.2}\n",
            summary.total,
            summary.suspicious,
            summary.suspicious_rate() * 100.0,
            summary.threshold
        ));
        out.push_str(&format!(
            "Amount: {:.2}  Suspicious amount: {:.2}\n",
            summary.total_amount, summary.suspicious_amount
        ));
        out
    }

    fn format_csv(outcome: &ScoringOutcome) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "transaction_id",
            "timestamp",
            "amount",
            "fraud_probability",
            "suspicious",
        ])?;
        for tx in &outcome.transactions {
            writer.write_record([
                tx.transaction_id.clone().unwrap_or_default(),
                tx.timestamp.clone(),
                tx.amount.to_string(),
                format!("{:.6}", tx.fraud_probability),
                tx.suspicious.to_string(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| FraudError::Io(std::io::Error::other(e.to_string())))?;
        String::from_utf8(bytes).map_err(|e| FraudError::Io(std::io::Error::other(e.to_string())))
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let info = ModelStore::inspect(&config.data.model_path)?;

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Path:           {}", config.data.model_path);
        println!("  Format version: {}", info.format_version);
        println!("  Conv channels:  {:?}", info.network.conv_channels);
        println!("  Kernel size:    {}", info.network.kernel_size);
        println!("  Pool size:      {}", info.network.pool_size);
        println!("  Dense units:    {}", info.network.dense_units);
        println!("  Dropout:        {}", info.network.dropout);
        println!("  Weights:        {} bytes", info.weights_bytes);
        println!("\nScaler statistics");
        println!("───────────────────────────────");
        for (j, name) in upi_fraud::features::FEATURE_NAMES.iter().enumerate() {
            println!(
                "  {:<28} mean {:>14.4}  std {:>14.4}",
                name, info.scaler.mean[j], info.scaler.std[j]
            );
        }
        let degenerate = info.scaler.degenerate_names();
        if !degenerate.is_empty() {
            println!("  Constant columns: {}", degenerate.join(", "));
        }

        Ok(())
    }

    pub fn synth(output: &str, rows: usize, fraud_rate: f64, seed: u64) -> Result<()> {
        let records = synthetic_transactions(rows, fraud_rate, seed)?;

        if let Some(parent) = std::path::Path::new(output).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(output)?;
        for record in &records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        let fraud_rows = records.iter().filter(|r| r.is_fraud == Some(1.0)).count();
        println!(
            "Wrote {} synthetic transactions ({} fraud) to {}",
            records.len(),
            fraud_rows,
            output
        );
        Ok(())
    }
}
