use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;

use volley::echo;
use volley::model::CodecKind;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8888")]
    listen: String,

    /// Wire format to speak
    #[arg(long, value_enum, default_value = "checksum")]
    codec: CodecKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind(&args.listen).await?;
    echo::serve(listener, args.codec).await
}
