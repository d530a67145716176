fn main() {
    // ESP-IDF link arguments; host builds need nothing.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
