use std::sync::Arc;

use tuntap_poll::{BoxError, Interface};

// Reads packets until Ctrl-C, which closes the interface and wakes the reader.
fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    let name = std::env::args().nth(1).unwrap_or_default();
    let dev = Arc::new(Interface::new_tun(&name)?);
    println!("name = {}", dev.name());

    let dev_t = dev.clone();
    let handle = ctrlc2::set_handler(move || {
        let _ = dev_t.close();
        true
    })
    .expect("Error setting Ctrl-C handler");

    let mut buf = [0; 65535];
    loop {
        match dev.recv(&mut buf) {
            Ok(amount) => println!("{:?}", &buf[0..amount]),
            Err(err) if err.is_closed() => break,
            Err(err) => return Err(err.into()),
        }
    }
    handle.join().unwrap();
    println!("closed");
    Ok(())
}
