use tuntap_poll::{AsyncInterface, BoxError};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    let dev = AsyncInterface::new_tun(&std::env::args().nth(1).unwrap_or_default())?;
    println!("name = {}", dev.name());
    let mut buf = vec![0; 65535];
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Quit...");
                break;
            }
            len = dev.recv(&mut buf) => {
                let len = len?;
                println!("len = {len}, pkt = {:?}", &buf[..len]);
            }
        }
    }
    Ok(())
}
