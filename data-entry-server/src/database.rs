use sqlx::sqlite::SqlitePool;

/// Create the sample tables and fill them when empty
pub async fn setup(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create customers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            country_code TEXT REFERENCES countries(code),
            status TEXT DEFAULT 'active',
            is_active BOOLEAN DEFAULT true
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create products table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            price REAL NOT NULL,
            stock INTEGER DEFAULT 0,
            category TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create orders table with foreign keys
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER REFERENCES customers(id),
            product_id INTEGER REFERENCES products(id),
            quantity INTEGER NOT NULL,
            total REAL NOT NULL,
            status TEXT DEFAULT 'pending'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Lookup table keyed by a client-supplied code
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS countries (
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    seed_sample_data(pool).await?;

    Ok(())
}

async fn seed_sample_data(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let customer_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
        .fetch_one(pool)
        .await?;

    if customer_count.0 > 0 {
        tracing::debug!("Sample data already present");
        return Ok(());
    }

    let countries = [
        ("DE", "Germany"),
        ("FR", "France"),
        ("GB", "United Kingdom"),
        ("NL", "Netherlands"),
        ("US", "United States"),
    ];
    for (code, name) in countries {
        sqlx::query("INSERT INTO countries (code, name) VALUES (?, ?)")
            .bind(code)
            .bind(name)
            .execute(pool)
            .await?;
    }

    let first_names = [
        "Alice", "Bob", "Charlie", "Diana", "Evan", "Fiona", "George", "Hannah", "Isaac", "Julia",
        "Kevin", "Laura", "Michael", "Nancy", "Oscar", "Patricia",
    ];
    let last_names = [
        "Johnson", "Smith", "Brown", "Prince", "Davis", "Wilson", "Taylor", "Anderson", "Thomas",
        "Jackson", "White", "Harris", "Martin",
    ];

    // 120 customers, every fifth one retired
    for index in 0..120 {
        let first = first_names[index % first_names.len()];
        let last = last_names[index % last_names.len()];
        let email = format!(
            "{}.{}{}@example.com",
            first.to_lowercase(),
            last.to_lowercase(),
            index
        );
        let active = index % 5 != 0;
        sqlx::query(
            "INSERT INTO customers (name, email, country_code, status, is_active) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(format!("{} {}", first, last))
        .bind(email)
        .bind(countries[index % countries.len()].0)
        .bind(if active { "active" } else { "retired" })
        .bind(active)
        .execute(pool)
        .await?;
    }

    let categories = ["Electronics", "Furniture", "Stationery", "Kitchen", "Garden"];
    let product_types = [
        "Laptop", "Mouse", "Keyboard", "Monitor", "Chair", "Desk", "Notebook", "Pen", "Lamp",
        "Shelf", "Kettle", "Hose",
    ];

    // 60 products
    for index in 0..60 {
        let product_type = product_types[index % product_types.len()];
        let category = categories[index % categories.len()];
        let price = 4.99 + (index as f64 * 7.5);
        let stock = (index * 11 + 3) % 250;

        sqlx::query("INSERT INTO products (name, price, stock, category) VALUES (?, ?, ?, ?)")
            .bind(format!("{} {}", product_type, index + 1))
            .bind(price)
            .bind(stock as i32)
            .bind(category)
            .execute(pool)
            .await?;
    }

    // 500 orders
    let statuses = ["pending", "processing", "shipped", "completed", "cancelled"];
    for index in 0..500 {
        let customer_id = (index % 120) + 1;
        let product_id = (index % 60) + 1;
        let quantity = (index % 6) + 1;
        let total = (quantity as f64) * (4.99 + ((product_id - 1) as f64 * 7.5));

        sqlx::query(
            "INSERT INTO orders (customer_id, product_id, quantity, total, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(customer_id as i32)
        .bind(product_id as i32)
        .bind(quantity as i32)
        .bind(total)
        .bind(statuses[index % statuses.len()])
        .execute(pool)
        .await?;
    }

    tracing::info!("Sample data seeded: 5 countries, 120 customers, 60 products, 500 orders");
    Ok(())
}
