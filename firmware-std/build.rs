fn main() {
    // ESP-IDF environment setup (must run before anything links)
    embuild::espidf::sysenv::output();

    println!("cargo:rerun-if-env-changed=PIEZOTONE_WIFI_SSID");
    println!("cargo:rerun-if-env-changed=PIEZOTONE_WIFI_PASS");
}
