use axum::response::Html;
use serde::Serialize;

#[derive(Serialize, utoipa::ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Welcome page HTML", content_type = "text/html")
    ),
    tag = "General"
)]
pub async fn root() -> Html<&'static str> {
    Html(r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <meta name="viewport" content="width=device-width, initial-scale=1.0">
            <title>VoxPDF</title>
            <style>
                body {
                    display: flex;
                    flex-direction: column;
                    justify-content: center;
                    align-items: center;
                    min-height: 100vh;
                    margin: 0;
                    font-family: Georgia, serif;
                    background: #fdf6ec;
                    color: #2d2a26;
                }
                h1 {
                    margin-bottom: 0.2em;
                }
                p.tagline {
                    color: #6b6257;
                    margin-top: 0;
                }
                ul {
                    list-style: none;
                    padding: 0;
                    color: #6b6257;
                    text-align: center;
                }
                li {
                    margin: 4px 0;
                }
            </style>
        </head>
        <body>
            <h1>VoxPDF</h1>
            <p class="tagline">Upload your PDFs, listen to them anywhere.</p>
            <ul>
                <li>POST /documents &middot; upload a PDF</li>
                <li>POST /documents/{id}/convert &middot; turn it into speech</li>
                <li>GET /documents/{id}/audio &middot; download the MP3</li>
            </ul>
            <a href="/swagger-ui/" style="
                margin-top: 16px;
                padding: 10px 20px;
                background-color: #8a5a2b;
                color: white;
                text-decoration: none;
                border-radius: 5px;
                font-weight: bold;
            ">
                Explore API Docs
            </a>
        </body>
        </html>
    "#)
}
