#[tokio::main]
async fn main() {
    if let Err(e) = odontoclinic_lib::run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
