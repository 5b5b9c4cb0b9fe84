#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    let _rocket = hostdesk::rocket().launch().await?;
    Ok(())
}
